// End-to-end tests for the feedmatch binary.
// Run with: cargo test -p feedmatch-cli --test cli_tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn feedmatch() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_feedmatch"));
    cmd.env_remove("RUST_LOG").env_remove("FEEDMATCH_CONFIG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const FEED: &str = "\
ID,Title,Name
ext1,Inception,Leonardo DiCaprio
ext2,Heat,Al Pacino
ext3,Unknown Film,Nobody
";

const MOVIES: &str = "\
MediaId,Title,StudioNetwork
100,Inception (2010),Xbox Video
5,Heat,Vudu
6,Heat,Xbox Video
";

const PEOPLE: &str = "\
movie_id,actors,director
100,\"Leonardo DiCaprio, Tom Hardy\",Christopher Nolan
9,\"Al Pacino, Robert De Niro\",Michael Mann
";

struct Catalog {
    dir: TempDir,
}

impl Catalog {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("feed.csv"), FEED).unwrap();
        std::fs::write(dir.path().join("movies.csv"), MOVIES).unwrap();
        std::fs::write(dir.path().join("people.csv"), PEOPLE).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn run(&self, extra: &[&str]) -> Output {
        self.run_with_feed(&self.path("feed.csv"), extra)
    }

    fn run_with_feed(&self, feed: &Path, extra: &[&str]) -> Output {
        feedmatch()
            .arg("run")
            .arg("--feed")
            .arg(feed)
            .arg("--primary")
            .arg(self.path("movies.csv"))
            .arg("--secondary")
            .arg(self.path("people.csv"))
            .args(extra)
            .output()
            .unwrap()
    }
}

// -------------------------------------------------------------------------
// run
// -------------------------------------------------------------------------

#[test]
fn run_prints_mappings_as_csv() {
    let catalog = Catalog::new();
    let output = catalog.run(&[]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "internal_id,external_id\n100,ext1\n5,ext2\n");
    assert!(stderr(&output).contains("xbox feed: 3 records, 2 mappings"), "{}", stderr(&output));
}

#[test]
fn run_json_report() {
    let catalog = Catalog::new();
    let output = catalog.run(&["--json", "--feed-type", "google-play"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["meta"]["feed_type"], "google_play");
    assert_eq!(report["summary"]["total_mappings"], 2);
    assert_eq!(report["summary"]["union_collisions"], 1);
    assert_eq!(report["mappings"][1]["internal_id"], 5);
    assert_eq!(report["mappings"][1]["external_id"], "ext2");
}

#[test]
fn run_writes_output_file() {
    let catalog = Catalog::new();
    let out = catalog.path("links.csv");
    let output = catalog.run(&["--output", out.to_str().unwrap()]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("wrote"));
    let written = std::fs::read_to_string(&out).unwrap();
    assert_eq!(written.lines().count(), 3);
}

#[test]
fn run_with_feed_column_config() {
    let catalog = Catalog::new();
    let config = catalog.write(
        "recon.toml",
        r#"
name = "network aware"

[primary]
feed_column = "studionetwork"
[primary.columns]
title = ["title"]
[primary.result]
internal = "mediaid"
external = "id"

[secondary.columns]
name = ["actors", "director"]
[secondary.result]
internal = "movie_id"
external = "id"
"#,
    );

    let output = catalog.run(&["--config", config.to_str().unwrap(), "-q"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    // No list columns configured: the cast column is indexed whole, so the
    // secondary join finds nothing and only the Xbox-labelled Heat survives.
    assert_eq!(stdout(&output), "internal_id,external_id\n6,ext2\n");
}

#[test]
fn quiet_suppresses_info_logs() {
    let catalog = Catalog::new();
    let output = catalog.run(&["--quiet"]);
    assert!(output.status.success());
    assert!(!stderr(&output).contains("INFO"), "{}", stderr(&output));
}

// -------------------------------------------------------------------------
// failures
// -------------------------------------------------------------------------

#[test]
fn missing_feed_file_exits_3() {
    let catalog = Catalog::new();
    let output = catalog.run_with_feed(&catalog.path("nope.csv"), &[]);
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("error: cannot read feed"), "{}", stderr(&output));
}

#[test]
fn empty_feed_file_exits_3() {
    let catalog = Catalog::new();
    let empty = catalog.write("empty.csv", "");
    let output = catalog.run_with_feed(&empty, &[]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn missing_column_exits_11_with_hint() {
    let catalog = Catalog::new();
    let feed = catalog.write("renamed.csv", "external,title,name\next1,Heat,x\n");
    let output = catalog.run_with_feed(&feed, &[]);

    assert_eq!(output.status.code(), Some(11));
    let err = stderr(&output);
    assert!(err.contains("missing column 'id'"), "{err}");
    assert!(err.contains("hint:"), "{err}");
}

#[test]
fn non_numeric_internal_id_exits_12() {
    let catalog = Catalog::new();
    catalog.write("movies.csv", "mediaid,title\ntt0113277,Heat\n");
    let output = catalog.run(&[]);
    assert_eq!(output.status.code(), Some(12));
    assert!(stderr(&output).contains("cannot parse internal id 'tt0113277'"));
}

#[test]
fn invalid_config_exits_10() {
    let catalog = Catalog::new();
    let config = catalog.write("bad.toml", "[primary.columns]\ntitle = []\n");
    let output = catalog.run(&["--config", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(10));
    assert!(stderr(&output).contains("feedmatch config"));
}

#[test]
fn unknown_feed_type_is_usage_error() {
    let catalog = Catalog::new();
    let output = catalog.run(&["--feed-type", "betamax"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("unknown feed type"));
}

// -------------------------------------------------------------------------
// validate + config
// -------------------------------------------------------------------------

#[test]
fn printed_default_config_validates() {
    let printed = feedmatch().arg("config").output().unwrap();
    assert!(printed.status.success());
    assert!(stdout(&printed).contains("[primary.result]"));

    let catalog = Catalog::new();
    let path = catalog.write("default.toml", &stdout(&printed));
    let output = feedmatch().arg("validate").arg(&path).output().unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(
        stderr(&output).contains("valid: 'movie catalog' with 1 primary and 2 secondary column pair(s)"),
        "{}",
        stderr(&output)
    );
}

#[test]
fn validate_rejects_missing_file() {
    let output = feedmatch().arg("validate").arg("/nonexistent/recon.toml").output().unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn version_prints_package_version() {
    let output = feedmatch().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), concat!("feedmatch ", env!("CARGO_PKG_VERSION")));
}

#[test]
fn feed_line_with_invalid_utf8_is_skipped() {
    let catalog = Catalog::new();
    let feed = catalog.path("latin1.csv");
    std::fs::write(&feed, b"id,title,name\next1,Caf\xe9,nobody\next2,Heat,\n".as_slice()).unwrap();
    let output = catalog.run_with_feed(&feed, &[]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "internal_id,external_id\n5,ext2\n");
    assert!(stderr(&output).contains("feed: 1 chunks skipped"), "{}", stderr(&output));
}
