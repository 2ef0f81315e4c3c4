use std::process::ExitCode;

fn main() -> ExitCode {
    tradedesk_cli::run()
}
