use super::args::*;

pub mod compare;
pub mod init;
pub(crate) mod run;
pub mod validate;
pub mod visualize;

use crate::exit_codes;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Validate(args) => validate::run(args),
        Command::Run(args) => run::run(args).await,
        Command::Compare(args) => compare::run(args),
        Command::Visualize(args) => visualize::run(args),
        Command::Init(args) => init::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}
