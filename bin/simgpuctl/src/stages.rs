//! ---
//! simgpu_section: "05-external-interfaces"
//! simgpu_subsection: "binary"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Control CLI for the simulated GPU device."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use anyhow::Result;
use clap::Args;
use serde_json::json;
use simgpu_mock::DECLARED_ORDER;

#[derive(Debug, Args)]
pub struct StagesArgs {
    /// Emit the order as a JSON array.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}

pub fn execute(args: StagesArgs) -> Result<()> {
    if args.json {
        let names: Vec<&str> = DECLARED_ORDER.iter().map(|stage| stage.as_str()).collect();
        println!("{}", serde_json::to_string_pretty(&json!(names))?);
        return Ok(());
    }
    for (index, stage) in DECLARED_ORDER.iter().enumerate() {
        println!("{:>2}  {}", index + 1, stage);
    }
    Ok(())
}
