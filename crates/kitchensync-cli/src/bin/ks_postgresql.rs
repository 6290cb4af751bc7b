//! `ks_postgresql`: the PostgreSQL endpoint binary (spec.md §6's CLI
//! surface). Parses connection arguments, connects, and hands the
//! resulting [`PostgresAdapter`] to the driver loop over stdio.

use std::process::ExitCode;

use asupersync::runtime::RuntimeBuilder;
use clap::Parser;

use kitchensync_postgres::{PgConfig, PostgresAdapter, SslMode as PgSslMode};

#[derive(Parser, Debug)]
#[command(name = "ks_postgresql", about = "Kitchen Sync PostgreSQL endpoint")]
struct Args {
    /// Hostname or IP address of the PostgreSQL server.
    #[arg(long, env = "PGHOST", default_value = "localhost")]
    host: String,

    /// Port number.
    #[arg(long, env = "PGPORT", default_value_t = 5432)]
    port: u16,

    /// Username for authentication.
    #[arg(long, env = "PGUSER")]
    user: String,

    /// Password for authentication; prompted via env rather than CLI
    /// history when possible.
    #[arg(long, env = "PGPASSWORD")]
    password: Option<String>,

    /// Database name to connect to.
    #[arg(long, env = "PGDATABASE")]
    database: String,

    /// Application name visible in `pg_stat_activity`.
    #[arg(long, default_value = "kitchen-sync")]
    application_name: String,

    /// SSL mode.
    #[arg(long, value_enum, default_value_t = SslModeArg::Prefer)]
    ssl_mode: SslModeArg,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SslModeArg {
    Disable,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl From<SslModeArg> for PgSslMode {
    fn from(mode: SslModeArg) -> Self {
        match mode {
            SslModeArg::Disable => PgSslMode::Disable,
            SslModeArg::Prefer => PgSslMode::Prefer,
            SslModeArg::Require => PgSslMode::Require,
            SslModeArg::VerifyCa => PgSslMode::VerifyCa,
            SslModeArg::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

fn main() -> ExitCode {
    kitchensync_cli::init_tracing();
    let args = Args::parse();

    let mut config = PgConfig::new(args.host.as_str(), args.user.as_str(), args.database.as_str())
        .port(args.port)
        .application_name(args.application_name.as_str())
        .ssl_mode(args.ssl_mode.into());
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

    let adapter = match rt.block_on(PostgresAdapter::connect(&cx, config)) {
        Ok(adapter) => adapter,
        Err(e) => {
            eprintln!("kitchen-sync: failed to connect to PostgreSQL: {e}");
            return ExitCode::FAILURE;
        }
    };

    match kitchensync_cli::run_endpoint(adapter) {
        0 => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
