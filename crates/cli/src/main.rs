use std::process::ExitCode;

fn main() -> ExitCode {
    replyguard_cli::run()
}
