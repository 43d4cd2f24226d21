//! Shelter record store CLI
//!
//! Command-line access to a shelter record store. Every command prints one
//! JSON value per line on stdout.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "shelter")]
#[command(about = "Shelter record store - validated CRUD over animal records", long_about = None)]
struct Cli {
    #[command(flatten)]
    store: commands::StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Insert one record given as a JSON object
    Create(commands::records::CreateArgs),
    /// Print records matching a JSON filter
    Read(commands::records::ReadArgs),
    /// Apply field changes to matching records
    Update(commands::records::UpdateArgs),
    /// Remove matching records
    Delete(commands::records::DeleteArgs),
    /// Create indexes over record fields
    Index(commands::admin::IndexArgs),
    /// Register a store user
    UserAdd(commands::admin::UserAddArgs),
    /// Check that the store can be opened and queried
    Ping,
}

fn main() {
    // A missing .env file is fine; flags and process env still apply.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = commands::init_logging(&cli.store).and_then(|()| match cli.command {
        Commands::Create(args) => commands::records::create(&cli.store, args),
        Commands::Read(args) => commands::records::read(&cli.store, args),
        Commands::Update(args) => commands::records::update(&cli.store, args),
        Commands::Delete(args) => commands::records::delete(&cli.store, args),
        Commands::Index(args) => commands::admin::index(&cli.store, args),
        Commands::UserAdd(args) => commands::admin::user_add(&cli.store, args),
        Commands::Ping => commands::admin::ping(&cli.store),
    });

    if let Err(e) = result {
        // The message can name a caller-supplied `_id`; keep it on stderr only.
        log::error!("event=cli_command module=cli status=error");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
