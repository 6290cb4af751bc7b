//! `ks_mysql`: the MySQL endpoint binary (spec.md §6's CLI surface).
//! Parses connection arguments, connects, and hands the resulting
//! [`MySqlAdapter`] to the driver loop over stdio.

use std::process::ExitCode;

use asupersync::runtime::RuntimeBuilder;
use clap::Parser;

use kitchensync_mysql::{MySqlAdapter, MySqlConfig, SslMode as MySqlSslMode};

#[derive(Parser, Debug)]
#[command(name = "ks_mysql", about = "Kitchen Sync MySQL endpoint")]
struct Args {
    /// Hostname or IP address of the MySQL server.
    #[arg(long, env = "MYSQL_HOST", default_value = "localhost")]
    host: String,

    /// Port number.
    #[arg(long, env = "MYSQL_TCP_PORT", default_value_t = 3306)]
    port: u16,

    /// Username for authentication.
    #[arg(long, env = "MYSQL_USER")]
    user: String,

    /// Password for authentication.
    #[arg(long, env = "MYSQL_PWD")]
    password: Option<String>,

    /// Database name to connect to.
    #[arg(long, env = "MYSQL_DATABASE")]
    database: String,

    /// SSL mode.
    #[arg(long, value_enum, default_value_t = SslModeArg::Preferred)]
    ssl_mode: SslModeArg,

    /// Enable client-side compression.
    #[arg(long, default_value_t = false)]
    compression: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SslModeArg {
    Disable,
    Preferred,
    Required,
    VerifyCa,
    VerifyIdentity,
}

impl From<SslModeArg> for MySqlSslMode {
    fn from(mode: SslModeArg) -> Self {
        match mode {
            SslModeArg::Disable => MySqlSslMode::Disable,
            SslModeArg::Preferred => MySqlSslMode::Preferred,
            SslModeArg::Required => MySqlSslMode::Required,
            SslModeArg::VerifyCa => MySqlSslMode::VerifyCa,
            SslModeArg::VerifyIdentity => MySqlSslMode::VerifyIdentity,
        }
    }
}

fn main() -> ExitCode {
    kitchensync_cli::init_tracing();
    let args = Args::parse();

    let mut config = MySqlConfig::new()
        .host(args.host.as_str())
        .port(args.port)
        .user(args.user.as_str())
        .database(args.database.as_str())
        .ssl_mode(args.ssl_mode.into())
        .compression(args.compression);
    if let Some(password) = &args.password {
        config = config.password(password.as_str());
    }

    let rt = match RuntimeBuilder::current_thread().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("kitchen-sync: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let cx = kitchensync_cli::root_cx();

    let adapter = match rt.block_on(MySqlAdapter::connect(&cx, config)) {
        Ok(adapter) => adapter,
        Err(e) => {
            eprintln!("kitchen-sync: failed to connect to MySQL: {e}");
            return ExitCode::FAILURE;
        }
    };

    match kitchensync_cli::run_endpoint(adapter) {
        0 => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
