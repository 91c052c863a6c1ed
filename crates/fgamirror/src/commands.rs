//! One-shot subcommands.

use std::sync::Arc;

use fgamirror_api::{TupleKey, TupleService};
use fgamirror_store::{FactColumn, Filter, Page};
use fgamirror_sync::{ChangeMirror, DeletionReconciler, SyncConfig, TupleBrowser};
use miette::Result;

use crate::Context;

fn service(ctx: &Context) -> Arc<dyn TupleService> {
    ctx.client.clone()
}

pub async fn sync_once(ctx: &Context, config: SyncConfig) -> Result<()> {
    let mirror = ChangeMirror::new(service(ctx), ctx.store.clone(), ctx.source.clone(), config);
    let report = mirror
        .run_cycle()
        .await
        .map_err(|e| miette::miette!("sync failed: {}", e))?;

    println!(
        "applied {} writes, {} deletes (cursor: {})",
        report.summary.writes,
        report.summary.deletes,
        report.cursor.as_deref().unwrap_or("<start>")
    );
    Ok(())
}

pub fn list(ctx: &Context, offset: usize, filter: &Filter) -> Result<()> {
    let browser = TupleBrowser::new(service(ctx), ctx.store.clone());
    let page = browser
        .page(offset, filter)
        .map_err(|e| miette::miette!("failed to load page: {}", e))?;

    match page {
        Some(page) => print_page(&page),
        None => println!("no matching tuples"),
    }
    Ok(())
}

fn print_page(page: &Page) {
    println!(
        "{:<12} {:<28} {:<14} {:<12} {:<28} {:<27} {:<7} {:>6}",
        "USER TYPE", "USER ID", "RELATION", "OBJECT TYPE", "OBJECT ID", "TIMESTAMP", "ACTION", "ROW"
    );
    for row in &page.rows {
        let fact = &row.fact;
        println!(
            "{:<12} {:<28} {:<14} {:<12} {:<28} {:<27} {:<7} {:>6}",
            fact.user_type,
            fact.user_id,
            fact.relation,
            fact.object_type,
            fact.object_id,
            fact.timestamp.to_rfc3339(),
            row.intent.map(|i| i.as_str()).unwrap_or(""),
            row.row
        );
    }
    println!(
        "rows {}-{} of {}",
        page.lower_bound, page.upper_bound, page.total
    );
}

pub fn types(ctx: &Context) -> Result<()> {
    let browser = TupleBrowser::new(service(ctx), ctx.store.clone());

    for (label, column) in [
        ("user types", FactColumn::UserType),
        ("relations", FactColumn::Relation),
        ("object types", FactColumn::ObjectType),
    ] {
        println!("{}: {}", label, browser.distinct_values(column).join(", "));
    }
    Ok(())
}

pub fn mark(ctx: &Context, user: &str, relation: &str, object: &str) -> Result<()> {
    let browser = TupleBrowser::new(service(ctx), ctx.store.clone());
    let key = TupleKey::new(user, relation, object).canonical();

    let marked = browser
        .mark_for_deletion(&key)
        .map_err(|e| miette::miette!("failed to mark {}: {}", key, e))?;

    if marked {
        println!("marked for deletion: {}", key);
    } else {
        println!("unchanged (not mirrored or already marked): {}", key);
    }
    Ok(())
}

pub async fn create(ctx: &Context, input: &str) -> Result<()> {
    let browser = TupleBrowser::new(service(ctx), ctx.store.clone());
    let key = browser
        .create(input)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    println!("written: {}", key);
    Ok(())
}

pub async fn sweep(ctx: &Context, config: SyncConfig) -> Result<()> {
    let reconciler = DeletionReconciler::new(service(ctx), ctx.store.clone(), config);
    let report = reconciler
        .sweep()
        .await
        .map_err(|e| miette::miette!("sweep failed: {}", e))?;

    println!(
        "attempted {}: {} accepted, {} rejected (now stale), {} failed",
        report.attempted, report.accepted, report.rejected, report.failed
    );
    Ok(())
}

pub fn prune(ctx: &Context) -> Result<()> {
    let reconciler = DeletionReconciler::new(service(ctx), ctx.store.clone(), SyncConfig::default());
    let removed = reconciler
        .prune()
        .map_err(|e| miette::miette!("prune failed: {}", e))?;

    println!("pruned {} stale tuples", removed);
    Ok(())
}
