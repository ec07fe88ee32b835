use std::process::ExitCode;

fn main() -> ExitCode {
    ordesk_cli::run()
}
