use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "periscope",
    version,
    about = "A live terminal viewer for Kubernetes resource collections."
)]
pub struct CliArgs {
    /// Start in a specific namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Start with all namespaces selected
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Usage polling interval in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub usage_ms: u64,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}
