//! Main entry point for the volread CLI application.
//!
//! Stitches the given parts into one virtual file and either describes it
//! or streams a range of it to stdout or a file.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

use volread::{
    Cli, HttpRangeReader, LocalFileReader, MediaType, PartSpec, ReadAt, Session, VirtualFile,
};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut remotes = Vec::new();
    let mut specs = Vec::with_capacity(cli.parts.len());
    for part in &cli.parts {
        let reader: Arc<dyn ReadAt> = if part.is_http_url() {
            let reader = Arc::new(HttpRangeReader::new(part.source.clone()).await?);
            remotes.push(Arc::clone(&reader));
            reader
        } else {
            Arc::new(LocalFileReader::new(Path::new(&part.source))?)
        };

        let mut spec = PartSpec::new(reader).with_base(part.base);
        if let Some(size) = part.size {
            spec = spec.with_size(size);
        }
        specs.push(spec);
    }

    let mut session = Session::new(cli.engine_config())?;
    session.load(VirtualFile::new(specs, MediaType::default())?)?;

    if cli.info {
        return print_info(&session, &cli);
    }

    if let Some(offset) = cli.locate {
        let (index, part) = session.locate(offset)?;
        println!(
            "{} is in part {} ({}) at physical offset {}",
            offset,
            index + 1,
            cli.parts[index].source,
            part.base() + (offset - part.start())
        );
        return Ok(());
    }

    let transferred = match &cli.output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
            stream(&session, &cli, &mut file).await?
        }
        None => stream(&session, &cli, &mut tokio::io::stdout()).await?,
    };

    if !cli.is_quiet() {
        eprintln!("Read {}", format_size(transferred));
        let network: u64 = remotes.iter().map(|r| r.transferred_bytes()).sum();
        if !remotes.is_empty() {
            eprintln!("Total bytes transferred: {}", format_size(network));
        }
    }

    Ok(())
}

/// Print the virtual file's size and part table.
fn print_info(session: &Session<u64>, cli: &Cli) -> Result<()> {
    let (total, available) = session.length()?;
    let file = session.file()?;

    println!("{:>14}  {:>14}  {:>12}  Source", "Start", "Size", "Base");
    println!("{}", "-".repeat(70));
    for (part, arg) in file.parts().iter().zip(&cli.parts) {
        println!(
            "{:>14}  {:>14}  {:>12}  {}",
            part.start(),
            part.size(),
            part.base(),
            arg.source
        );
    }
    println!("{}", "-".repeat(70));
    println!(
        "{:>14}  {:>14}  {} parts, {} available",
        "",
        total,
        file.parts().len(),
        format_size(available)
    );

    Ok(())
}

/// Copy the requested range of the virtual file to `out`.
///
/// Returns the number of bytes written.
async fn stream<W: AsyncWrite + Unpin>(session: &Session<u64>, cli: &Cli, out: &mut W) -> Result<u64> {
    let (total, _) = session.length()?;
    if cli.offset > total {
        bail!("offset {} is past the end of the file ({} bytes)", cli.offset, total);
    }
    let end = match cli.length {
        Some(length) => cli.offset.saturating_add(length).min(total),
        None => total,
    };

    let written = if cli.sync {
        stream_sync(session, cli.offset, end, out).await?
    } else {
        stream_async(session, cli.offset, end, out).await?
    };

    out.flush().await?;
    Ok(written)
}

/// Keep up to `max_in_flight` requests queued and write them out as they
/// complete. Completions arrive in submission order.
async fn stream_async<W: AsyncWrite + Unpin>(
    session: &Session<u64>,
    start: u64,
    end: u64,
    out: &mut W,
) -> Result<u64> {
    let config = session.config();
    let alignment = session.alignment();
    let mut next = start;
    let mut expected = start;
    let mut in_flight = 0usize;

    while expected < end {
        while in_flight < config.max_in_flight && next < end {
            let wanted = (config.chunk_size as u64).min(end - next);
            // The tail may be shorter than the alignment allows; ask for the
            // padded length and drop the extra bytes when writing.
            let length = alignment.round_up(wanted) as usize;
            let buffer = session.alloc_buffer(length)?;
            session.request(next, length, buffer, next)?;
            next += wanted;
            in_flight += 1;
        }

        let done = session.wait_for_next(config.wait_timeout).await?;
        in_flight -= 1;

        if done.token != expected {
            bail!("read at {} completed out of order (expected {})", done.token, expected);
        }
        if !done.is_complete() {
            bail!("read at {} stopped after {} bytes: {:?}", done.token, done.bytes, done.outcome);
        }

        let take = (done.bytes as u64).min(end - expected) as usize;
        out.write_all(&done.data()[..take]).await?;
        expected += take as u64;
    }

    Ok(expected - start)
}

/// Read one chunk at a time with the blocking-style reader.
async fn stream_sync<W: AsyncWrite + Unpin>(
    session: &Session<u64>,
    start: u64,
    end: u64,
    out: &mut W,
) -> Result<u64> {
    let chunk = session.config().chunk_size;
    let mut buf = vec![0u8; chunk];
    let mut pos = start;

    while pos < end {
        let length = (chunk as u64).min(end - pos) as usize;
        let read = session.sync_read(pos, &mut buf[..length]).await?;

        out.write_all(&buf[..read.bytes]).await?;
        pos += read.bytes as u64;

        if !read.is_complete() {
            bail!("read at {} stopped after {} bytes: {:?}", pos, read.bytes, read.outcome);
        }
    }

    Ok(pos - start)
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
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
