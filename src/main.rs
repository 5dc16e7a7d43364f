//! gitrig binary entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    match gitrig::cli::run() {
        Ok(code) => code,
        Err(err) => {
            gitrig::ui::output::error(format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
