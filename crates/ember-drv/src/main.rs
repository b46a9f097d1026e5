use std::process::ExitCode;

use ember_drv::{parse_args, Mode, Session, UsageError};

fn main() -> ExitCode {
    match parse_args(std::env::args()) {
        Ok((mode, config)) => {
            let mut session = Session::new(config);
            let code = match mode {
                Mode::Repl => session.run_repl(),
                Mode::RunFile(path) => session.run_file(&path),
            };
            ExitCode::from(code as u8)
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(UsageError::EXIT_CODE as u8)
        }
    }
}
