use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wty")]
#[command(about = "Warranty code lifecycle: scan, activate, and manage QR code batches", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Backend base URL (overrides backend.base_url from the config file)
    #[arg(long, global = true, env = "WTY_BACKEND")]
    pub backend: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Look up a code and show where its workflow continues
    Scan {
        /// Serial number printed on the sticker
        serial: String,
    },

    /// Activate a code on behalf of a customer, as a shop
    Activate(ActivateArgs),

    /// Show warranty coverage of an activated code
    Warranty {
        /// Serial number printed on the sticker
        serial: String,

        /// Print the record and coverage as JSON
        #[arg(long)]
        json: bool,
    },

    /// Administer batches, codes and shops
    #[command(subcommand)]
    Admin(AdminCommands),

    /// Open the interactive batch console
    Ui {
        /// Run against built-in sample data instead of the backend
        #[arg(long)]
        demo: bool,

        /// Directory exported documents are written to
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ActivateArgs {
    /// Serial number printed on the sticker
    pub serial: String,

    /// Shop ID used to log in
    #[arg(long)]
    pub shop: String,

    /// Shop password
    #[arg(long, env = "WTY_SHOP_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Customer name
    #[arg(long)]
    pub name: String,

    /// Customer phone number
    #[arg(long)]
    pub phone: String,

    /// Customer address
    #[arg(long)]
    pub address: String,
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Log in and remember the admin credential
    Login {
        #[arg(long)]
        username: String,

        #[arg(long, env = "WTY_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored admin credential
    Logout,

    /// List batches
    Batches {
        /// Search by batch ID or product name
        #[arg(long)]
        search: Option<String>,
    },

    /// List the codes of one batch
    Codes {
        /// Batch ID
        batch: String,

        /// Search by serial number
        #[arg(long)]
        search: Option<String>,

        /// activated, pending or any
        #[arg(long, default_value = "any")]
        status: String,

        /// Shop ID, "unassigned" or "any"
        #[arg(long, default_value = "any")]
        shop: String,
    },

    /// Assign codes to a shop
    Assign {
        /// Shop ID
        #[arg(long)]
        shop: String,

        /// Code IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete codes
    Delete {
        /// Code IDs
        #[arg(required = true)]
        ids: Vec<String>,

        /// Skip confirmation
        #[arg(long, short)]
        force: bool,
    },

    /// Export codes as a printable PDF
    Export {
        /// Code IDs
        #[arg(required = true)]
        ids: Vec<String>,

        /// Lay the codes out as a sticker sheet
        #[arg(long)]
        sticker_sheet: bool,

        /// Sticker sheet vertical spacing
        #[arg(long, default_value = "0.05")]
        vertical_spacing: f64,

        /// Sticker sheet horizontal spacing
        #[arg(long, default_value = "0.0")]
        horizontal_spacing: f64,

        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Download the PDF of every code of a product
    ProductPdf {
        /// Product ID
        product: String,

        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Generate a new batch of codes for a product
    Generate {
        /// Product ID
        #[arg(long)]
        product: String,

        /// Number of codes (1 to 1000)
        #[arg(long)]
        quantity: u32,
    },

    /// Delete a batch and all of its codes
    DeleteBatch {
        /// Batch ID
        batch: String,

        /// Skip confirmation
        #[arg(long, short)]
        force: bool,
    },

    /// Show dashboard statistics
    Stats,

    /// List the codes assigned to a shop
    ShopCodes {
        /// Shop ID
        shop: String,
    },
}
