use clap::Parser;
use vmclink::{
    app::App,
    cli::{Cli, Command},
    Result,
};

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Completions { shell }) => {
            Cli::print_completions(shell);
            Ok(())
        }
        None => App::from_options(cli.run)?.run(),
    }
}
