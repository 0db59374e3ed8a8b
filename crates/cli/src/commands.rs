use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Bring the schema to the configured (or given) version
    Migrate {
        #[arg(long, help = "Target version, overrides TESSERA_SCHEMA_VERSION")]
        to: Option<String>,
    },
    /// Show the deployed version and any migration in flight
    Status {
        #[arg(long, help = "Print the status as JSON")]
        json: bool,
    },
    /// List the scripts a migration would apply, without running them
    Plan {
        #[arg(long, help = "Target version, overrides TESSERA_SCHEMA_VERSION")]
        to: Option<String>,

        #[arg(long, help = "Print the plan as JSON")]
        json: bool,
    },
    /// Check that migrating from a version ends in the same schema as a
    /// fresh setup at the target, using two scratch schemas
    Verify {
        #[arg(long, help = "Version the stepped-up schema starts from")]
        from: String,

        #[arg(long, help = "Target version, overrides TESSERA_SCHEMA_VERSION")]
        to: Option<String>,
    },
    /// Fetch one keyset page from a table
    Page(PageArgs),
}

#[derive(Args)]
pub struct PageArgs {
    #[arg(long, help = "Table to read from")]
    pub table: String,

    #[arg(long, help = "Seek field of a first page")]
    pub field: Option<String>,

    #[arg(long, help = "Rank rows by similarity of the seek field to this text")]
    pub search: Option<String>,

    #[arg(long, help = "Sort the seek field descending")]
    pub desc: Option<bool>,

    #[arg(long, conflicts_with = "cursor")]
    pub first: Option<usize>,

    #[arg(long, conflicts_with = "cursor")]
    pub last: Option<usize>,

    #[arg(long, help = "Resume from a cursor returned by a previous page")]
    pub cursor: Option<String>,

    #[arg(long, requires = "cursor")]
    pub next: Option<usize>,

    #[arg(long, requires = "cursor")]
    pub prev: Option<usize>,

    #[arg(
        long,
        value_name = "FIELD=VALUE",
        help = "Equality filter, may be repeated"
    )]
    pub filter: Vec<String>,

    #[arg(
        long,
        help = "If specified, writes the page to this file instead of stdout"
    )]
    pub output: Option<String>,
}
