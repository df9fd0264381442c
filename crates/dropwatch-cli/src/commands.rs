use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "dropwatch")]
#[command(about = "Files incoming deliverables into a dated archive tree", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch the configured folder until interrupted (default)
    Watch,
    /// Print configuration values
    PrintConfig,
    /// Show where a file name would be filed today
    Route {
        /// File name following MATERIAL_ACTIVITY_TITLE.ext
        file_name: String,
    },
    /// Write sample mapping files if they do not exist
    InitMappings,
}
