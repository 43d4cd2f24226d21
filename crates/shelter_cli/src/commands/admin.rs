//! Store administration commands
//!
//! Usage:
//!   shelter index [FIELD[:asc|desc]]... [--defaults]
//!   shelter user-add <USERNAME> <PASSWORD>
//!   shelter ping

use super::{parse_sort_key, print_json, CommandResult, StoreArgs};
use clap::Args;
use serde_json::json;
use shelter_core::db::{open_connection, register_user};
use shelter_core::{Credentials, SortKey};

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Fields of one compound index, in key order
    #[arg(value_name = "FIELD[:asc|desc]", required_unless_present = "defaults")]
    pub fields: Vec<String>,

    /// Create the single-field dashboard indexes instead
    #[arg(long, conflicts_with = "fields")]
    pub defaults: bool,
}

#[derive(Debug, Args)]
pub struct UserAddArgs {
    pub username: String,
    pub password: String,
}

pub fn index(store: &StoreArgs, args: IndexArgs) -> CommandResult {
    let accessor = store.connect()?;
    let names = if args.defaults {
        accessor.create_default_indexes()?
    } else {
        let keys = args
            .fields
            .iter()
            .map(|raw| parse_sort_key(raw))
            .collect::<Result<Vec<SortKey>, _>>()?;
        vec![accessor.create_index(&keys)?]
    };
    accessor.close()?;

    for name in names {
        print_json(&json!({ "index": name }))?;
    }
    Ok(())
}

/// Registers a user. Once the store has users, the caller must authenticate
/// with `--username/--password` to add more.
pub fn user_add(store: &StoreArgs, args: UserAddArgs) -> CommandResult {
    let conn = open_connection(&store.connection_config()?)?;
    register_user(&conn, &Credentials::new(args.username.trim(), args.password))?;
    conn.close().map_err(|(_, err)| err)?;
    print_json(&json!({ "user": args.username.trim(), "status": "created" }))
}

pub fn ping(store: &StoreArgs) -> CommandResult {
    let accessor = store.connect()?;
    accessor.ping()?;
    accessor.close()?;
    print_json(&json!({ "ok": 1 }))
}
