// src/main.rs

use std::process::ExitCode;

use kiln::{cli, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("kiln error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
