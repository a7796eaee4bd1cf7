use anyhow::Result;

use pcsc_cardnum::cli::commands::run_cli;

fn main() -> Result<()> {
    run_cli()
}
