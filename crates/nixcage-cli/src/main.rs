//! # nixcage — rootless bundle launcher
//!
//! Placed next to an `entrypoint` symlink, an embedded `nix` store, and an
//! empty `mountroot` directory, this binary assembles a synthetic root in an
//! unprivileged mount/user namespace, chroots into it, and execs the real
//! application with the original arguments. The success path never returns;
//! any failure exits with status 127.

use std::convert::Infallible;
use std::env;
use std::ffi::OsString;
use std::process;

use nixcage_common::bundle::Bundle;
use nixcage_common::constants::{APP_NAME, ENV_DEBUG_LD, EXIT_EXECERROR};
use nixcage_common::error::Result;
use nixcage_core::bootstrap;
use tracing_subscriber::EnvFilter;

#[allow(clippy::print_stderr)]
fn main() {
    init_tracing();

    let argv0 = program_name(env::args_os().next());
    let error = match launch(&argv0) {
        Ok(never) => match never {},
        Err(error) => error,
    };
    // The fatal diagnostic must reach stderr regardless of how the
    // subscriber is filtered.
    eprintln!("{argv0}: {error}");
    process::exit(EXIT_EXECERROR);
}

/// Diagnostic name for the process. argv[0] is legal exec input in any
/// encoding, so it is converted lossily rather than trusted to be UTF-8.
fn program_name(arg0: Option<OsString>) -> String {
    arg0.map_or_else(
        || APP_NAME.to_owned(),
        |arg| arg.to_string_lossy().into_owned(),
    )
}

fn launch(argv0: &str) -> Result<Infallible> {
    let argv = bootstrap::exec_argv(env::args_os())?;
    let bundle = Bundle::from_current_exe(argv0)?;
    bootstrap::run(&bundle, &argv)
}

/// Initializes the stderr subscriber. Setting the debug-enable flag routes
/// every search-path resolution decision to the error stream.
fn init_tracing() {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if env::var(ENV_DEBUG_LD).is_ok_and(|value| !value.is_empty()) {
        for directive in ["nixcage_ldpath=debug", "nixcage_core=debug"] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
