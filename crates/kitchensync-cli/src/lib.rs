//! Shared plumbing for the two endpoint binaries (`ks_postgresql`,
//! `ks_mysql`): tracing setup and the stdio driver-loop runner every
//! binary wraps around its own, already-connected
//! [`kitchensync_adapter::Adapter`].
//!
//! Connection argument parsing and the connect call stay in each binary
//! (the two engines' config types don't share a shape worth abstracting
//! over), but running the endpoint driver to completion and turning its
//! result into a process exit code is identical either way.

use std::io;

use asupersync::app::App;
use asupersync::runtime::RuntimeBuilder;
use asupersync::Cx;
use kitchensync_adapter::Adapter;
use kitchensync_core::error::Result;
use kitchensync_core::FramedStream;

/// Install a `tracing` subscriber reading `RUST_LOG` (default `info`),
/// writing to stderr so stdout stays reserved for the framed protocol.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

/// The root capability context for a live endpoint process.
///
/// `Cx::for_testing()` is a lab-runtime stub reserved for `#[cfg(test)]`
/// and rustdoc examples; a real session talking to a live database goes
/// through `asupersync`'s own application root instead.
pub fn root_cx() -> Cx {
    App::new().cx()
}

/// Drive the endpoint loop over stdin/stdout with an already-connected
/// `adapter`, on a single-threaded `asupersync` runtime, printing any
/// fatal error to stderr. Returns the process exit code: `0` on a
/// clean `quit`, non-zero otherwise (spec.md §6).
pub fn run_endpoint<A: Adapter>(mut adapter: A) -> i32 {
    let stdio = StdioDuplex { stdin: io::stdin(), stdout: io::stdout() };
    let mut stream = FramedStream::new(stdio);

    let rt = match RuntimeBuilder::current_thread().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("kitchen-sync: failed to start runtime: {e}");
            return 1;
        }
    };
    let cx = root_cx();

    let result: Result<()> = rt.block_on(kitchensync_driver::run(&mut stream, &cx, &mut adapter, None));
    match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "endpoint session ended with an error");
            eprintln!("kitchen-sync: {e}");
            1
        }
    }
}

/// `stdin`/`stdout` bundled into the single `Read + Write` type
/// [`FramedStream`] expects.
struct StdioDuplex {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl io::Read for StdioDuplex {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdin.read(buf)
    }
}

impl io::Write for StdioDuplex {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}
