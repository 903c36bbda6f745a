use anyhow::Result;
use reelsearch_cli::{help_text, parse_args, run, Invocation};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = match parse_args(std::env::args_os()) {
        Ok(Invocation::Run(cli)) => cli,
        Ok(Invocation::Help) => {
            println!("{}", help_text());
            return Ok(());
        }
        Err(e) => e.exit(),
    };

    match run(cli)? {
        Some(output) => println!("{output}"),
        None => println!("{}", help_text()),
    }
    Ok(())
}
