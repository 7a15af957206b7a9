// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Init, Run, Version};

command_enum! {
    (Init, Init),
    (Run, Run),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let ctx = cli::op::OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            // events own stdout while running
            eprintln!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
