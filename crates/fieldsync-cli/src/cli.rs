use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Inspect and drain the offline sync queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to engine config JSON
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a create/update/delete for an entity
    Enqueue {
        /// Operation kind (create, update, delete)
        kind: String,
        /// Entity (customer, work-order, invoice, payment, prospect, activity)
        entity: String,
        /// JSON payload (read from stdin when omitted)
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
        /// Priority, lower is more urgent
        #[arg(long)]
        priority: Option<i32>,
    },
    /// Queue a raw request with an explicit URL and method
    Request {
        /// HTTP method (POST, PUT, PATCH, DELETE)
        method: String,
        /// Absolute URL or path relative to the API base URL
        url: String,
        /// JSON payload (read from stdin when omitted)
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
        /// Priority, lower is more urgent
        #[arg(long)]
        priority: Option<i32>,
    },
    /// List queued operations in drain order
    #[command(alias = "ls")]
    Queue {
        /// Only items that ran out of retries
        #[arg(long)]
        dead: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Give a failed operation a fresh retry budget
    Retry {
        /// Operation ID or unique ID prefix
        #[arg(required_unless_present = "all")]
        id: Option<String>,
        /// Retry every operation that ran out of retries
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Drop a queued operation without sending it
    Discard {
        /// Operation ID or unique ID prefix
        id: String,
    },
    /// Store a photo or signature for upload
    Capture {
        /// Capture kind
        #[arg(value_enum)]
        kind: CaptureKind,
        /// Entity the capture belongs to
        #[arg(long)]
        entity: String,
        /// ID of the owning record
        #[arg(long, value_name = "ID")]
        parent_id: String,
        /// File to read
        file: PathBuf,
        /// MIME type (guessed from the file extension when omitted)
        #[arg(long, value_name = "TYPE")]
        mime_type: Option<String>,
    },
    /// Drain the queue against the API
    Sync {
        /// Also upload pending photos and signatures
        #[arg(long)]
        media: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show sync state and queue counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently resolved conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CaptureKind {
    Photo,
    Signature,
}
