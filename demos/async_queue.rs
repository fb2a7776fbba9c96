// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, Local};
use clickhouse_http_client::{Builder, Client, CsvFormatter, Error};
use tracing_subscriber::EnvFilter;

const TABLE: &str = "summing_url_views";
const COLUMNS: [&str; 6] = ["event_time", "url_hash", "site_id", "views", "v_00", "v_55"];

async fn create_table(client: &Client) -> anyhow::Result<()> {
    client
        .write(format!("DROP TABLE IF EXISTS {}", TABLE))
        .await?;
    client
        .write(format!(
            r#"CREATE TABLE IF NOT EXISTS {} (
                event_date Date DEFAULT toDate(event_time),
                event_time DateTime,
                url_hash String,
                site_id Int32,
                views Int32,
                v_00 Int32,
                v_55 Int32
            ) ENGINE = SummingMergeTree(
                event_date, (site_id, url_hash, event_time, event_date), 8192
            )"#,
            TABLE
        ))
        .await?;
    println!("Create table {} success!", TABLE);
    Ok(())
}

async fn make_data_file(path: &PathBuf, rows: usize) -> anyhow::Result<()> {
    let now = Local::now();
    let mut data = String::new();
    for i in 0..rows {
        let event_time = now - Duration::seconds(i as i64);
        data.push_str(&format!(
            "{},{:x},{},{},{},{}\n",
            event_time.format("%Y-%m-%d %H:%M:%S"),
            i * 7919,
            i % 5,
            i % 100,
            i % 2,
            i % 3
        ));
    }

    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn load_before_flush(client: &mut Client, files: &[PathBuf]) -> anyhow::Result<()> {
    let _select = client.select_async(format!("SELECT * FROM {} LIMIT 1", TABLE))?;
    match client.insert_batch_files(TABLE, files, &COLUMNS).await {
        Err(Error::QueueNotEmpty) => println!("Batch load refused: {}", Error::QueueNotEmpty),
        other => anyhow::bail!("Unexpected batch load result:{:?}", other.map(|v| v.len())),
    }

    client.execute_async().await;
    Ok(())
}

async fn read_before_flush(client: &mut Client) -> anyhow::Result<()> {
    let select = client.select_async(format!("SELECT * FROM {} LIMIT 1", TABLE))?;
    if let Err(e) = select.rows() {
        println!("Read before flush failed: {}", e);
    }

    client.execute_async().await;
    Ok(())
}

async fn flush_then_load(client: &mut Client, files: &[PathBuf]) -> anyhow::Result<()> {
    let select = client.select_async(format!("SELECT count() FROM {}", TABLE))?;
    client.execute_async().await;
    println!("Rows before load:{:?}", select.fetch_one_column("count()")?);

    for stat in client.insert_batch_files(TABLE, files, &COLUMNS).await? {
        stat.check()?;
        println!("Loaded file, info:{:?}", stat.info()?);
    }

    let select = client.select_async(format!("SELECT * FROM {} LIMIT 5", TABLE))?;
    client.execute_async().await;
    println!("Rows in the resp:\n{}", CsvFormatter::try_new(&select)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // you should ensure clickhouse is running, and http port is set to 8123
    let mut client = Builder::new("127.0.0.1:8123".to_string())
        .authorization("default", "")
        .build()?;

    let dir = tempfile::tempdir()?;
    let files: Vec<_> = (1..=2)
        .map(|i| dir.path().join(format!("clickhouse_test.{}.data", i)))
        .collect();
    for file in &files {
        make_data_file(file, 10).await?;
    }

    println!("------------------------------------------------------------------");
    println!("### create table:");
    create_table(&client).await?;
    println!("------------------------------------------------------------------");

    println!("### batch load with a queued select:");
    load_before_flush(&mut client, &files).await?;
    println!("------------------------------------------------------------------");

    println!("### read before flush:");
    read_before_flush(&mut client).await?;
    println!("------------------------------------------------------------------");

    println!("### flush, then batch load:");
    flush_then_load(&mut client, &files).await?;
    println!("------------------------------------------------------------------");

    println!("### drop table:");
    client.write(format!("DROP TABLE {}", TABLE)).await?;
    println!("------------------------------------------------------------------");

    Ok(())
}
