//! Single-shot lock commands: acquire, touch, release, query, list.

use std::time::Duration;

use anyhow::Result;
use dbsem_core::{LockInfo, LockStatus};
use serde::Serialize;

use super::{Context, EXIT_HELD_ELSEWHERE};

pub async fn acquire(ctx: &Context, name: &str, owner: &str, timeout: Duration) -> Result<i32> {
    let info = ctx.service.acquire(name, owner, timeout, &ctx.cancel).await?;

    if ctx.json {
        print_json(&info)?;
    } else if info.is_held() {
        let verb = if info.status == LockStatus::ForcedAcquired {
            "Took over expired"
        } else {
            "Acquired"
        };
        println!(
            "{verb} lock '{}' as {} (expires {})",
            info.name,
            info.owner,
            info.expires_at_utc.to_rfc3339()
        );
    } else {
        println!(
            "Lock '{}' is held by {} until {}",
            info.name,
            info.owner,
            info.expires_at_utc.to_rfc3339()
        );
    }

    Ok(if info.is_held() { 0 } else { EXIT_HELD_ELSEWHERE })
}

pub async fn touch(ctx: &Context, name: &str) -> Result<i32> {
    ctx.service.touch(name, &ctx.cancel).await?;
    if ctx.json {
        print_json(&Ack { name, action: "touched" })?;
    } else {
        println!("Touched lock '{name}'");
    }
    Ok(0)
}

pub async fn release(ctx: &Context, name: &str) -> Result<i32> {
    ctx.service.release(name, &ctx.cancel).await?;
    if ctx.json {
        print_json(&Ack { name, action: "released" })?;
    } else {
        println!("Released lock '{name}'");
    }
    Ok(0)
}

pub async fn query(ctx: &Context, name: &str, owner: &str) -> Result<i32> {
    let info = ctx.service.query(name, owner, &ctx.cancel).await?;
    if ctx.json {
        print_json(&info)?;
    } else {
        match &info {
            Some(info) => println!("{}", describe(info)),
            None => println!("Lock '{name}' is not held"),
        }
    }
    Ok(0)
}

pub async fn list(ctx: &Context, owner: &str) -> Result<i32> {
    let locks = ctx.service.list(owner, &ctx.cancel).await?;
    if ctx.json {
        print_json(&locks)?;
    } else if locks.is_empty() {
        println!("No locks");
    } else {
        println!("Locks ({}):", locks.len());
        for info in &locks {
            println!("  {}", describe(info));
        }
    }
    Ok(0)
}

#[derive(Serialize)]
struct Ack<'a> {
    name: &'a str,
    action: &'static str,
}

fn describe(info: &LockInfo) -> String {
    format!(
        "{} held by {} [{}] (expires {})",
        info.name,
        info.owner,
        info.status,
        info.expires_at_utc.to_rfc3339()
    )
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
