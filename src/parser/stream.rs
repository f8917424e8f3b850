//! Line streams over downloader output.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::parser::{LineClassifier, ProgressEvent};

/// Classify every line of `reader` into a stream of events.
///
/// Useful for replaying a captured transcript. The stream ends at EOF or on
/// the first read error.
pub fn classify_lines<R>(
    reader: R,
    classifier: LineClassifier,
) -> impl futures_core::Stream<Item = ProgressEvent>
where
    R: AsyncRead + Unpin,
{
    let lines = BufReader::new(reader).lines();

    futures_util::stream::unfold((lines, classifier), |(mut lines, mut classifier)| async move {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let event = classifier.classify(&line);
                Some((event, (lines, classifier)))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Stopped reading downloader output");
                None
            }
        }
    })
}
