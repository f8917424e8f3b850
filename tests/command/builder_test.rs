//! Integration tests for the command builder.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ytdlp_driver::command::{split_flag_string, validate_tokens, CommandBuilder, CommandError};
use ytdlp_driver::sink::{LogSink, NullSink, Severity};

fn builder() -> CommandBuilder {
    CommandBuilder::new(Arc::new(NullSink))
}

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<(Severity, String)>>,
}

impl LogSink for RecordingSink {
    fn log(&self, severity: Severity, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[test]
fn round_trip_format_folder_template_url() {
    let mut b = builder()
        .format("b")
        .unwrap()
        .output_folder("/out")
        .unwrap()
        .output_template("%(title)s.%(ext)s")
        .unwrap();
    let args = b.build("http://x").unwrap();

    assert_eq!(value_after(&args, "-f"), Some("b"));
    assert!(value_after(&args, "-o")
        .unwrap()
        .ends_with("/out/%(title)s.%(ext)s"));
    assert_eq!(args.last().map(String::as_str), Some("http://x"));
}

#[test]
fn windows_folder_is_normalised() {
    let mut b = builder().output_folder(r"D:\media\clips\").unwrap();
    let args = b.build("http://x").unwrap();
    assert_eq!(
        value_after(&args, "-o"),
        Some("D:/media/clips/%(title)s.%(ext)s")
    );
}

#[test]
fn template_tokens_pass_through_verbatim() {
    let template = "%(uploader)s/%(upload_date>%Y-%m-%d)s - %(title).80s [%(id)s].%(ext)s";
    let mut b = builder().output_template(template).unwrap();
    let args = b.build("http://x").unwrap();
    assert_eq!(value_after(&args, "-o"), Some(template));
}

#[test]
fn url_is_last_even_when_it_looks_like_a_flag() {
    let mut b = builder();
    let args = b.build("-dQw4w9WgXcQ").unwrap();
    let n = args.len();
    assert_eq!(args[n - 2], "--");
    assert_eq!(args[n - 1], "-dQw4w9WgXcQ");
}

#[test]
fn unknown_custom_flag_is_rejected() {
    let mut b = builder().add_custom_flag("--not-a-real-flag-xyz");
    assert_eq!(
        b.rejections(),
        [CommandError::InvalidOption {
            flag: "--not-a-real-flag-xyz".to_string()
        }]
    );

    let args = b.build("http://x").unwrap();
    assert!(!args.iter().any(|a| a == "--not-a-real-flag-xyz"));
}

#[test]
fn flag_policy_applied_consistently() {
    let candidates = [
        "--no-mtime",
        "--not-a-real-flag-xyz",
        "--limit-rate 50K",
        "--exec 'echo done'",
        "--restrict-filenames --no-part",
        "--retries 3 --ffmpeg-location /tmp/evil",
        "--concurrent-fragments=4",
        "--batch-file urls.txt",
        "-N 8",
    ];

    let mut b = builder();
    for raw in candidates {
        b = b.add_custom_flag(raw);
    }
    let args = b.build("http://x").unwrap();

    for raw in candidates {
        let tokens = split_flag_string(raw).unwrap();
        let accepted = validate_tokens(&tokens).is_ok();
        for token in tokens.iter().filter(|t| t.starts_with('-')) {
            let present = args.iter().any(|a| a == token);
            assert_eq!(present, accepted, "{raw:?}: token {token:?}");
        }
    }
}

#[test]
fn rejected_custom_flag_leaves_builder_untouched() {
    let before = builder().no_playlist();
    let expected = before.pending_flags().to_vec();

    let after = before.add_custom_flag("--no-mtime --exec ls");
    assert_eq!(after.pending_flags(), expected.as_slice());
    assert_eq!(after.rejections().len(), 1);
}

#[test]
fn rejection_is_logged_as_error() {
    let sink = Arc::new(RecordingSink::default());
    let _ = CommandBuilder::new(Arc::clone(&sink) as Arc<dyn LogSink>)
        .add_custom_flag("--postprocessor-args 'ffmpeg:-y'");

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, Severity::Error);
    assert!(entries[0].1.contains("--postprocessor-args"));
}

#[test]
fn unterminated_quote_is_rejected() {
    let b = builder().add_custom_flag("--user-agent \"Mozilla/5.0");
    assert!(matches!(
        b.rejections(),
        [CommandError::InvalidValue { .. }]
    ));
    assert!(b.pending_flags().is_empty());
}

#[test]
fn quoted_custom_value_stays_one_argument() {
    let mut b = builder().add_custom_flag("--user-agent \"Mozilla/5.0 (X11; Linux)\"");
    let args = b.build("http://x").unwrap();
    assert_eq!(
        value_after(&args, "--user-agent"),
        Some("Mozilla/5.0 (X11; Linux)")
    );
}

#[test]
fn typed_setters_emit_expected_flags() {
    let mut b = builder()
        .proxy("socks5://127.0.0.1:1080")
        .unwrap()
        .socket_timeout(Duration::from_secs(15))
        .unwrap()
        .retries(10)
        .fragment_retries(20)
        .rate_limit("4.2M")
        .unwrap()
        .concurrent_fragments(4)
        .unwrap()
        .force_ipv4()
        .subtitles(&["en", "de"])
        .unwrap()
        .embed_subtitles()
        .embed_thumbnail()
        .merge_output_format("mkv")
        .unwrap();
    let args = b.build("http://x").unwrap();

    assert_eq!(value_after(&args, "--proxy"), Some("socks5://127.0.0.1:1080"));
    assert_eq!(value_after(&args, "--socket-timeout"), Some("15"));
    assert_eq!(value_after(&args, "--retries"), Some("10"));
    assert_eq!(value_after(&args, "--fragment-retries"), Some("20"));
    assert_eq!(value_after(&args, "--limit-rate"), Some("4.2M"));
    assert_eq!(value_after(&args, "--concurrent-fragments"), Some("4"));
    assert_eq!(value_after(&args, "--sub-langs"), Some("en,de"));
    assert_eq!(value_after(&args, "--merge-output-format"), Some("mkv"));
    for flag in ["--force-ipv4", "--write-subs", "--embed-subs", "--embed-thumbnail"] {
        assert!(args.iter().any(|a| a == flag), "missing {flag}");
    }
}

#[test]
fn extract_audio_and_credentials() {
    let mut b = builder()
        .extract_audio("mp3")
        .unwrap()
        .credentials("user", "secret")
        .unwrap();
    let args = b.build("http://x").unwrap();
    assert!(args.iter().any(|a| a == "--extract-audio"));
    assert_eq!(value_after(&args, "--audio-format"), Some("mp3"));
    assert_eq!(value_after(&args, "--username"), Some("user"));
    assert_eq!(value_after(&args, "--password"), Some("secret"));
}

#[test]
fn invalid_arguments_fail_synchronously() {
    assert_eq!(
        builder().concurrent_fragments(0).unwrap_err(),
        CommandError::InvalidValue {
            option: "concurrent fragments",
            reason: "must be at least 1".to_string(),
        }
    );
    assert_eq!(
        builder().output_folder("").unwrap_err(),
        CommandError::EmptyValue {
            option: "output folder"
        }
    );
    assert_eq!(builder().build(""), Err(CommandError::EmptyUrl));
}

#[test]
fn build_drains_flags_but_keeps_settings() {
    let mut b = builder()
        .format("bv*+ba")
        .unwrap()
        .output_folder("/out")
        .unwrap()
        .add_custom_flag("--no-mtime");

    let first = b.build("http://a").unwrap();
    assert!(first.iter().any(|a| a == "--no-mtime"));

    let second = b.build("http://b").unwrap();
    assert!(!second.iter().any(|a| a == "--no-mtime"));
    assert_eq!(value_after(&second, "-f"), Some("bv*+ba"));
    assert_eq!(
        b.get_output_folder(),
        Some(std::path::Path::new("/out"))
    );
}

#[test]
fn cloned_builder_is_independent() {
    let base = builder().add_custom_flag("--no-mtime");
    let mut first = base.clone();
    let mut second = base.add_custom_flag("--no-part");

    let a = first.build("http://a").unwrap();
    let b = second.build("http://b").unwrap();
    assert!(!a.iter().any(|x| x == "--no-part"));
    assert!(b.iter().any(|x| x == "--no-part"));
    assert!(b.iter().any(|x| x == "--no-mtime"));
}
