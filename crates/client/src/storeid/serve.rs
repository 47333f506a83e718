//! Concurrent driver for the store-id line protocol.
//!
//! Every input line becomes its own task, so a slow probe never holds up
//! unrelated lines. Replies funnel through one writer task which writes and
//! flushes whole lines. On EOF the driver waits for every in-flight task and
//! for the writer to drain before returning. Input is read as raw bytes, so
//! a line that is not UTF-8 or is too long is answered and skipped without
//! stopping the helper.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use layercache_core::Error;

use super::Normalizer;
use super::line::MAX_LINE_BYTES;

/// Serve helper lines from `reader` until EOF, writing replies to `writer`.
///
/// At most `max_in_flight` lines are processed at once; reading pauses while
/// the limit is reached. Reading stops early if the writer fails, since no
/// further reply could be delivered. Returns the writer once every reply is
/// flushed.
///
/// # Errors
///
/// Returns `Error::Io` if reading input or writing a reply fails.
pub async fn serve_lines<R, W>(
    normalizer: Arc<Normalizer>, mut reader: R, writer: W, max_in_flight: usize,
) -> Result<W, Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(write_replies(writer, rx));

    let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut tasks = JoinSet::new();
    let mut received = 0usize;

    let read_result = loop {
        let mut raw = Vec::new();
        let read = tokio::select! {
            biased;
            _ = tx.closed() => {
                tracing::warn!("reply writer closed, no longer reading input");
                break Ok(());
            }
            read = read_raw_line(&mut reader, &mut raw) => read,
        };
        let truncated = match read {
            Ok(Some(truncated)) => truncated,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        received += 1;

        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => break Err(std::io::Error::other(e)),
        };
        if tx.is_closed() {
            tracing::warn!("reply writer closed, no longer reading input");
            break Ok(());
        }

        let normalizer = normalizer.clone();
        let tx = tx.clone();
        tasks.spawn(async move {
            if let Some(reply) = normalizer.handle_raw_line(&raw, truncated).await
                && tx.send(reply.to_string()).is_err()
            {
                tracing::debug!("reply dropped, writer is gone");
            }
            drop(permit);
        });

        while let Some(joined) = tasks.try_join_next() {
            log_join(joined);
        }
    };

    while let Some(joined) = tasks.join_next().await {
        log_join(joined);
    }
    drop(tx);

    let writer = writer_task
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;

    read_result?;
    tracing::info!(lines = received, "input closed, all replies written");

    Ok(writer)
}

/// Read one line into `buf`, at most `MAX_LINE_BYTES` of it.
///
/// Returns `None` at EOF, otherwise whether the line was cut short. The rest
/// of a cut line is consumed and discarded.
async fn read_raw_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<bool>>
where
    R: AsyncBufRead + Unpin,
{
    let n = (&mut *reader).take(MAX_LINE_BYTES as u64).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(None);
    }

    let truncated = n == MAX_LINE_BYTES && !buf.ends_with(b"\n");
    if truncated {
        skip_rest_of_line(reader).await?;
    }
    Ok(Some(truncated))
}

async fn skip_rest_of_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }

        match available.iter().position(|b| *b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

async fn write_replies<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>) -> Result<W, Error>
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut reply) = rx.recv().await {
        reply.push('\n');
        if let Err(e) = write_line(&mut writer, reply.as_bytes()).await {
            tracing::error!(error = %e, "failed to write helper reply");
            return Err(e.into());
        }
    }
    Ok(writer)
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &[u8]) -> std::io::Result<()> {
    writer.write_all(line).await?;
    writer.flush().await
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "helper line task failed");
    }
}
