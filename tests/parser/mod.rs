//! Parser module tests.


/// Verify all public parser types are exported from the library.
#[test]
fn test_all_parser_types_exported() {
    use std::sync::Arc;
    use ytdlp_driver::parser::{
        classify_lines, parse_format_table, parse_metadata, DownloadProgress, FormatRow, Fragment,
        InfoLevel, LineClassifier, LineKind, LineRule, ParserState, PatternError, PatternTable,
        PostProcessThresholds, ProgressEvent, VideoMetadata,
    };
    use ytdlp_driver::sink::NullSink;

    let classifier = LineClassifier::new(Arc::new(NullSink));
    let _: &ParserState = classifier.state();
    let _ = PatternTable::with_default_rules();
    let _: Result<LineRule, PatternError> = LineRule::new(LineKind::Destination, "x");
    let _ = PostProcessThresholds::default();
    let _ = classify_lines(tokio::io::empty(), classifier);
    let _: Vec<FormatRow> = parse_format_table("");
    let _: Result<VideoMetadata, _> = parse_metadata("{}");

    let _ = ProgressEvent::DownloadProgress(DownloadProgress {
        percent: 0.0,
        size_text: String::new(),
        speed_text: String::new(),
        eta: None,
        fragment: Some(Fragment { index: 1, total: 2 }),
    });
    let _ = InfoLevel::Warning;
}
