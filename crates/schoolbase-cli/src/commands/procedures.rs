use anyhow::Result;
use schoolbase_reconcile::{KNOWN_PROCEDURES, install_script};

use crate::cli::OutputFormat;
use crate::output::print_value;

pub fn list(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => {
            for procedure in KNOWN_PROCEDURES {
                println!("{}({})", procedure.name, procedure.arguments.join(", "));
            }
        }
        other => print_value(&serde_json::to_value(KNOWN_PROCEDURES)?, other),
    }
    Ok(())
}

pub fn sql() -> Result<()> {
    print!("{}", install_script());
    Ok(())
}
