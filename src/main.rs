//! Command-line front end for the ZIP+4 container reader and the EPF client.

use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info};

use zip4county::cli::{ArchiveArgs, Command, EpfArgs};
use zip4county::epf::{EpfClient, FileStatus, Session};
use zip4county::record::Record;
use zip4county::{CityStateDetail, Cli, Container, CountyIndex, write_csv_row};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    match cli.command {
        Command::Files {
            epf,
            product_code,
            product_id,
            status,
        } => list_files(&epf, product_code.zip(product_id), &status).await,
        Command::Download {
            epf,
            file_id,
            output,
            mark_complete,
        } => download(&epf, &file_id, output.as_deref(), mark_complete).await,
        Command::Counties { archive, zip } => {
            let index = tokio::task::spawn_blocking(move || build_index(&archive)).await??;
            match zip {
                Some(zip) => print_counties(&index, &zip),
                None => index
                    .write_csv(BufWriter::new(std::io::stdout().lock()))
                    .context("Failed to write CSV"),
            }
        }
        Command::CityState { archive } => {
            tokio::task::spawn_blocking(move || dump_city_state(&archive)).await?
        }
        Command::Ls { tar } => tokio::task::spawn_blocking(move || list_container(&tar)).await?,
    }
}

async fn login(epf: &EpfArgs) -> Result<Session> {
    let client = EpfClient::new()?;
    let version = client.version().await?;
    debug!("EPF service version {} build {}", version.version, version.build);
    client.login(&epf.epf_email, &epf.epf_password).await
}

async fn list_files(
    epf: &EpfArgs,
    product: Option<(String, String)>,
    statuses: &[String],
) -> Result<()> {
    let mut session = login(epf).await?;
    let files = match product {
        Some((code, id)) => {
            let statuses: Vec<FileStatus> =
                statuses.iter().map(|s| FileStatus::from_code(s)).collect();
            session.files_by_product(&code, &id, &statuses).await?
        }
        None => session.files().await?,
    };

    for f in &files {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            f.id,
            f.status,
            format_size(f.size),
            f.fulfilled,
            f.filename,
            f.path,
            f.product_code,
            f.product_id
        );
    }
    session.logout().await
}

async fn download(
    epf: &EpfArgs,
    file_id: &str,
    output: Option<&Path>,
    mark_complete: bool,
) -> Result<()> {
    let mut session = login(epf).await?;

    let written = match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            session.download(file_id, &mut file).await?
        }
        None => session.download(file_id, &mut tokio::io::stdout()).await?,
    };
    info!("downloaded {} for file {file_id}", format_size(written));

    if mark_complete {
        session
            .set_status(file_id, &FileStatus::DownloadComplete)
            .await?;
    }
    session.logout().await
}

fn build_index(archive: &ArchiveArgs) -> Result<CountyIndex> {
    let container = open_container(&archive.tar)?;
    let index = CountyIndex::from_container(&container, &archive.zip_password)?;
    Ok(index)
}

fn print_counties(index: &CountyIndex, zip: &str) -> Result<()> {
    let Some(counties) = index.get(zip) else {
        bail!("ZIP code {zip} not found");
    };
    println!("{}", counties.join(","));
    Ok(())
}

fn dump_city_state(archive: &ArchiveArgs) -> Result<()> {
    let container = open_container(&archive.tar)?;
    let records = container.city_state_records(&archive.zip_password)?;

    let mut out = BufWriter::new(std::io::stdout().lock());
    let header: Vec<&str> = CityStateDetail::SCHEMA.fields.iter().map(|f| f.name).collect();
    write_csv_row(&mut out, &header)?;
    for record in records {
        write_csv_row(&mut out, &record?.values())?;
    }
    out.flush()?;
    Ok(())
}

fn list_container(path: &Path) -> Result<()> {
    let container = open_container(path)?;
    for entry in container.entries()? {
        println!("{:>12}  {}", entry.size, entry.name);
        if !entry.is_regular() || !entry.name.ends_with(".zip") {
            continue;
        }

        let archive = container.open_archive(&entry.name)?;
        for member in archive.entries() {
            let (year, month, day) = member.mod_date();
            let (hour, minute, _second) = member.mod_time();
            println!(
                "{:>12}  {:>12}  {:04}-{:02}-{:02} {:02}:{:02}  {}  {}",
                member.uncompressed_size,
                member.compressed_size,
                year,
                month,
                day,
                hour,
                minute,
                if member.is_encrypted() { "E" } else { "-" },
                member.file_name
            );
        }
    }
    Ok(())
}

fn open_container(path: &Path) -> Result<Container> {
    Container::open(path).with_context(|| format!("Failed to open container {}", path.display()))
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
