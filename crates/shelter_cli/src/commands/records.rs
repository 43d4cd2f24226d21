//! Record commands
//!
//! Usage:
//!   shelter create <RECORD>
//!   shelter read [FILTER] [--projection <JSON>] [--sort <FIELD[:asc|desc]>]... [--limit <N>]
//!   shelter update <FILTER> <CHANGES> [--one]
//!   shelter delete <FILTER> [--one]

use super::{parse_json, parse_sort_key, print_json, CommandResult, StoreArgs};
use clap::Args;
use serde_json::{json, Value};
use shelter_core::{FindOptions, Projection};

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Record as a JSON object, e.g. '{"name":"Rex","animal_type":"Dog"}'
    pub record: String,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Filter as a JSON object; omitted selects every record
    pub filter: Option<String>,

    /// Projection as a JSON object, e.g. '{"name":1,"_id":0}'
    #[arg(long)]
    pub projection: Option<String>,

    /// Sort key, repeatable; ties fall back to insertion order
    #[arg(long = "sort", value_name = "FIELD[:asc|desc]")]
    pub sort: Vec<String>,

    /// Maximum number of records; 0 means unlimited
    #[arg(long)]
    pub limit: Option<u32>,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Filter selecting the records to change
    pub filter: String,

    /// Field values to set, as a JSON object
    pub changes: String,

    /// Only change the first matching record
    #[arg(long)]
    pub one: bool,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Filter selecting the records to remove
    pub filter: String,

    /// Only remove the first matching record
    #[arg(long)]
    pub one: bool,
}

pub fn create(store: &StoreArgs, args: CreateArgs) -> CommandResult {
    let record = parse_json("record", &args.record)?;
    let accessor = store.connect()?;
    let id = accessor.create(&record)?;
    accessor.close()?;
    print_json(&json!({ "_id": id }))
}

pub fn read(store: &StoreArgs, args: ReadArgs) -> CommandResult {
    let filter = match &args.filter {
        Some(raw) => parse_json("filter", raw)?,
        None => Value::Null,
    };

    let mut options = FindOptions::default();
    if let Some(raw) = &args.projection {
        options = options.with_projection(Projection::parse(&parse_json("projection", raw)?)?);
    }
    for raw in &args.sort {
        options = options.with_sort(parse_sort_key(raw)?);
    }
    if let Some(limit) = args.limit {
        options = options.with_limit(limit);
    }

    let accessor = store.connect()?;
    for record in accessor.read(&filter, options)? {
        print_json(&record?.into_value())?;
    }
    accessor.close()?;
    Ok(())
}

pub fn update(store: &StoreArgs, args: UpdateArgs) -> CommandResult {
    let filter = parse_json("filter", &args.filter)?;
    let changes = parse_json("changes", &args.changes)?;

    let accessor = store.connect()?;
    let modified = if args.one {
        accessor.update_one(&filter, &changes)?
    } else {
        accessor.update(&filter, &changes)?
    };
    accessor.close()?;
    print_json(&json!({ "modified": modified }))
}

pub fn delete(store: &StoreArgs, args: DeleteArgs) -> CommandResult {
    let filter = parse_json("filter", &args.filter)?;

    let accessor = store.connect()?;
    let deleted = if args.one {
        accessor.delete_one(&filter)?
    } else {
        accessor.delete(&filter)?
    };
    accessor.close()?;
    print_json(&json!({ "deleted": deleted }))
}
