use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bluetube_core::config::PipelineSettings;
use bluetube_core::contract::{
    ConvertInvocation, Device, DownloadInvocation, Feed, MockConverter, MockDeviceLink,
    MockDownloader, MockEventListener, MockFeedSource, MockSelector,
};
use bluetube_core::error::{FeedError, ToolError};
use bluetube_core::model::{Entity, EntityLink, OutputFormat, Playlist};
use bluetube_core::pipeline::PipelineContext;
use bluetube_core::profiles::Profiles;
use bluetube_core::staging::NOT_CONVERTED_DIR;
use bluetube_core::store::EntryStore;
use bluetube_core::synchronise::{synchronise, RunReport};
use tempfile::{tempdir, TempDir};

const AUTHOR: &str = "Lecturer";
const TITLE: &str = "Lectures";
const DEVICE_ID: &str = "00:11:22:33:44:55";

type Invocations = Arc<Mutex<Vec<DownloadInvocation>>>;

struct Fixture {
    home: TempDir,
    staging: PathBuf,
    out_a: PathBuf,
    out_b: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let home = tempdir().unwrap();
        let staging = home.path().join("staging");
        let out_a = home.path().join("out_a");
        let out_b = home.path().join("out_b");
        for dir in [&staging, &out_a, &out_b] {
            fs::create_dir_all(dir).unwrap();
        }
        Self {
            home,
            staging,
            out_a,
            out_b,
        }
    }

    fn profiles(&self) -> Profiles {
        let toml = format!(
            r#"
[__download__]
  [__download__.audio]
  output_format = "mp3"
  [__download__.video]
  output_format = "mp4"

[to_a]
  [to_a.send]
  local_path = "{a}"

[to_b]
  [to_b.send]
  local_path = "{b}"

[phone_a]
  [phone_a.convert]
  output_format = "3gp"
  codecs_options = "-c:v h263"
  [phone_a.send]
  local_path = "{a}"

[phone_b]
  [phone_b.convert]
  output_format = "3gp"
  codecs_options = "-c:v h263 -s qcif"
  [phone_b.send]
  local_path = "{b}"

[both]
  [both.send]
  bluetooth_device_id = "{DEVICE_ID}"
  local_path = "{a}"

[keep]
"#,
            a = self.out_a.display(),
            b = self.out_b.display(),
        );
        Profiles::from_toml_str(&toml).unwrap()
    }

    fn settings(&self) -> PipelineSettings {
        PipelineSettings::new(self.staging.clone())
    }

    fn store(&self) -> EntryStore {
        EntryStore::open(self.home.path())
    }

    fn seed(&self, profiles: &[&str]) {
        let mut playlist = Playlist::new(
            TITLE,
            "https://www.youtube.com/feeds/videos.xml?playlist_id=PL1",
            OutputFormat::Video,
            profiles.iter().map(|p| p.to_string()).collect(),
        );
        playlist.last_update = 1000;
        self.store().add(AUTHOR, playlist).unwrap();
    }

    fn playlist(&self) -> Playlist {
        self.store()
            .get_playlist(AUTHOR, TITLE)
            .unwrap()
            .unwrap()
            .clone()
    }
}

fn entry(id: &str, published: i64) -> Entity {
    Entity::new(
        format!("video {id}"),
        format!("https://www.youtube.com/watch?v={id}"),
        published,
        "",
        AUTHOR,
    )
}

fn feeds_returning(entries: Vec<Entity>) -> MockFeedSource {
    let feed = Feed {
        title: TITLE.to_string(),
        author: AUTHOR.to_string(),
        entries,
    };
    let mut feeds = MockFeedSource::new();
    feeds.expect_fetch().returning(move |_| Ok(feed.clone()));
    feeds
}

fn selector(accept: bool) -> MockSelector {
    let mut selector = MockSelector::new();
    selector.expect_select().returning(move |_| accept);
    selector
}

fn listener() -> MockEventListener {
    let mut listener = MockEventListener::new();
    listener.expect_notify().returning(|_| ());
    listener
}

fn no_conversions() -> MockConverter {
    let mut converter = MockConverter::new();
    converter.expect_convert().never();
    converter
}

fn file_id(link: &str) -> String {
    link.rsplit('=').next().unwrap_or("x").to_string()
}

/// Writes `<id>.mp4` into the staging directory.
fn staging_downloader(staging: &Path, calls: Invocations) -> MockDownloader {
    let staging = staging.to_path_buf();
    let mut downloader = MockDownloader::new();
    downloader
        .expect_download()
        .returning(move |invocation: &DownloadInvocation| {
            calls.lock().unwrap().push(invocation.clone());
            let path = staging.join(format!("{}.mp4", file_id(&invocation.link)));
            fs::write(&path, b"media").unwrap();
            Ok(path)
        });
    downloader
}

fn failing_downloader(calls: Invocations) -> MockDownloader {
    let mut downloader = MockDownloader::new();
    downloader
        .expect_download()
        .returning(move |invocation: &DownloadInvocation| {
            calls.lock().unwrap().push(invocation.clone());
            Err(ToolError::Failed {
                tool: "yt-dlp".to_string(),
                status: "exit status: 1".to_string(),
            })
        });
    downloader
}

struct Collaborators {
    feeds: MockFeedSource,
    selector: MockSelector,
    downloader: MockDownloader,
    converter: MockConverter,
    device_link: MockDeviceLink,
}

async fn run_pass(fx: &Fixture, c: Collaborators) -> RunReport {
    run_pass_with(fx, c, fx.settings()).await
}

async fn run_pass_with(fx: &Fixture, c: Collaborators, settings: PipelineSettings) -> RunReport {
    let profiles = fx.profiles();
    let listener = listener();
    let ctx = PipelineContext {
        feeds: &c.feeds,
        selector: &c.selector,
        downloader: &c.downloader,
        converter: &c.converter,
        device_link: &c.device_link,
        listener: &listener,
        profiles: &profiles,
        settings: &settings,
    };
    let mut store = fx.store();
    synchronise(&mut store, &ctx).await.unwrap()
}

#[tokio::test]
async fn accepted_new_entry_is_downloaded_delivered_and_released() {
    let fx = Fixture::new();
    fx.seed(&["to_a"]);
    let calls = Invocations::default();

    let mut selector = MockSelector::new();
    selector
        .expect_select()
        .withf(|e| e.published == 1100)
        .times(1)
        .returning(|_| true);

    let report = run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(vec![entry("old", 900), entry("new", 1100)]),
            selector,
            downloader: staging_downloader(&fx.staging, calls.clone()),
            converter: no_conversions(),
            device_link: MockDeviceLink::new(),
        },
    )
    .await;

    assert_eq!(report.shown, 1);
    assert_eq!(report.chosen, 1);
    assert_eq!(report.done, 1);
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert!(fx.out_a.join("new.mp4").exists());
    assert!(!fx.staging.join("new.mp4").exists());

    let playlist = fx.playlist();
    assert_eq!(playlist.last_update, 1100);
    assert_eq!(playlist.backlog_len(), 0);
}

#[tokio::test]
async fn rejected_entry_advances_watermark_and_is_never_shown_again() {
    let fx = Fixture::new();
    fx.seed(&["to_a"]);
    let entries = vec![entry("old", 900), entry("new", 1100)];

    let mut downloader = MockDownloader::new();
    downloader.expect_download().never();
    let report = run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(entries.clone()),
            selector: selector(false),
            downloader,
            converter: no_conversions(),
            device_link: MockDeviceLink::new(),
        },
    )
    .await;
    assert_eq!(report.shown, 1);
    assert_eq!(report.chosen, 0);
    assert_eq!(fx.playlist().last_update, 1100);

    let mut silent = MockSelector::new();
    silent.expect_select().never();
    let mut downloader = MockDownloader::new();
    downloader.expect_download().never();
    let report = run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(entries),
            selector: silent,
            downloader,
            converter: no_conversions(),
            device_link: MockDeviceLink::new(),
        },
    )
    .await;
    assert_eq!(report.shown, 0);
    assert_eq!(fx.playlist().last_update, 1100);
}

#[tokio::test]
async fn identical_requests_of_two_profiles_download_once() {
    let fx = Fixture::new();
    fx.seed(&["to_a", "to_b"]);
    let calls = Invocations::default();

    let report = run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(vec![entry("new", 1100)]),
            selector: selector(true),
            downloader: staging_downloader(&fx.staging, calls.clone()),
            converter: no_conversions(),
            device_link: MockDeviceLink::new(),
        },
    )
    .await;

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(report.done, 2);
    assert!(fx.out_a.join("new.mp4").exists());
    assert!(fx.out_b.join("new.mp4").exists());
    assert!(!fx.staging.join("new.mp4").exists());
}

#[tokio::test]
async fn failed_download_is_retried_first_with_the_same_invocation() {
    let fx = Fixture::new();
    fx.seed(&["to_a"]);

    let first_calls = Invocations::default();
    run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(vec![entry("new", 1100)]),
            selector: selector(true),
            downloader: failing_downloader(first_calls.clone()),
            converter: no_conversions(),
            device_link: MockDeviceLink::new(),
        },
    )
    .await;

    let playlist = fx.playlist();
    let backlog = &playlist.failed_entities["to_a"];
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].attempts, 1);
    assert!(matches!(backlog[0].link, EntityLink::Remote { .. }));
    assert_eq!(playlist.last_update, 1100);

    let second_calls = Invocations::default();
    let report = run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(vec![entry("newer", 1200), entry("new", 1100)]),
            selector: selector(true),
            downloader: staging_downloader(&fx.staging, second_calls.clone()),
            converter: no_conversions(),
            device_link: MockDeviceLink::new(),
        },
    )
    .await;

    let second = second_calls.lock().unwrap().clone();
    let links: Vec<&str> = second.iter().map(|i| i.link.as_str()).collect();
    assert_eq!(
        links,
        vec![
            "https://www.youtube.com/watch?v=new",
            "https://www.youtube.com/watch?v=newer"
        ]
    );
    assert_eq!(second[0], first_calls.lock().unwrap()[0]);
    assert_eq!(report.done, 2);
    assert_eq!(fx.playlist().backlog_len(), 0);
}

#[tokio::test]
async fn conversion_under_one_profile_leaves_sibling_copy_untouched() {
    let fx = Fixture::new();
    fx.seed(&["phone_a", "keep"]);
    let calls = Invocations::default();

    let mut converter = MockConverter::new();
    converter
        .expect_convert()
        .times(1)
        .returning(|invocation: &ConvertInvocation| {
            fs::write(&invocation.output, b"converted").unwrap();
            Ok(())
        });

    let report = run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(vec![entry("new", 1100)]),
            selector: selector(true),
            downloader: staging_downloader(&fx.staging, calls.clone()),
            converter,
            device_link: MockDeviceLink::new(),
        },
    )
    .await;

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(report.done, 2);
    assert!(fx.out_a.join("new.3gp").exists());
    assert!(!fx.staging.join("new.3gp").exists());
    // the profile without a send section keeps its unconverted file
    assert!(fx.staging.join("new.mp4").exists());
}

#[tokio::test]
async fn conversions_with_different_codecs_get_their_own_files() {
    let fx = Fixture::new();
    fx.seed(&["phone_a", "phone_b"]);
    let calls = Invocations::default();

    let mut converter = MockConverter::new();
    converter
        .expect_convert()
        .times(2)
        .returning(|invocation: &ConvertInvocation| {
            assert!(!invocation.output.exists());
            fs::write(&invocation.output, invocation.codec_args.join(" ")).unwrap();
            Ok(())
        });

    let report = run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(vec![entry("new", 1100)]),
            selector: selector(true),
            downloader: staging_downloader(&fx.staging, calls.clone()),
            converter,
            device_link: MockDeviceLink::new(),
        },
    )
    .await;

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(report.done, 2);
    assert_eq!(
        fs::read_to_string(fx.out_a.join("new.3gp")).unwrap(),
        "-c:v h263"
    );
    assert_eq!(
        fs::read_to_string(fx.out_b.join("new (1).3gp")).unwrap(),
        "-c:v h263 -s qcif"
    );
}

#[tokio::test]
async fn conversion_failure_quarantines_the_source() {
    let fx = Fixture::new();
    fx.seed(&["phone_a"]);

    let mut converter = MockConverter::new();
    converter.expect_convert().returning(|_| {
        Err(ToolError::Failed {
            tool: "ffmpeg".to_string(),
            status: "exit status: 1".to_string(),
        })
    });

    run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(vec![entry("new", 1100)]),
            selector: selector(true),
            downloader: staging_downloader(&fx.staging, Invocations::default()),
            converter,
            device_link: MockDeviceLink::new(),
        },
    )
    .await;

    assert!(fx.staging.join(NOT_CONVERTED_DIR).join("new.mp4").exists());
    assert!(!fx.staging.join("new.mp4").exists());
    let playlist = fx.playlist();
    let backlog = &playlist.failed_entities["phone_a"];
    assert_eq!(backlog.len(), 1);
    assert!(matches!(backlog[0].link, EntityLink::Remote { .. }));
}

#[tokio::test]
async fn repeated_failures_keep_the_backlog_size() {
    let fx = Fixture::new();
    fx.seed(&["to_a", "to_b"]);
    let mut settings = fx.settings();
    settings.max_attempts = 10;

    for _ in 0..3 {
        run_pass_with(
            &fx,
            Collaborators {
                feeds: feeds_returning(vec![entry("new", 1100)]),
                selector: selector(true),
                downloader: failing_downloader(Invocations::default()),
                converter: no_conversions(),
                device_link: MockDeviceLink::new(),
            },
            settings.clone(),
        )
        .await;
        let playlist = fx.playlist();
        assert_eq!(playlist.backlog_len(), 2);
        assert_eq!(playlist.failed_entities["to_a"].len(), 1);
        assert_eq!(playlist.failed_entities["to_b"].len(), 1);
    }
}

#[tokio::test]
async fn entity_is_dropped_after_max_attempts() {
    let fx = Fixture::new();
    fx.seed(&["to_a"]);
    let mut settings = fx.settings();
    settings.max_attempts = 2;

    let failing_pass = || Collaborators {
        feeds: feeds_returning(vec![entry("new", 1100)]),
        selector: selector(true),
        downloader: failing_downloader(Invocations::default()),
        converter: no_conversions(),
        device_link: MockDeviceLink::new(),
    };

    let first = run_pass_with(&fx, failing_pass(), settings.clone()).await;
    assert_eq!(first.dropped, 0);
    assert_eq!(fx.playlist().backlog_len(), 1);

    let last = run_pass_with(&fx, failing_pass(), settings).await;
    assert_eq!(last.dropped, 1);
    assert_eq!(fx.playlist().backlog_len(), 0);
}

#[tokio::test]
async fn partial_delivery_keeps_the_file_and_retries_every_channel() {
    let fx = Fixture::new();
    fx.seed(&["both"]);

    let mut absent = MockDeviceLink::new();
    absent.expect_discover().times(1).returning(|_| Ok(None));
    run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(vec![entry("new", 1100)]),
            selector: selector(true),
            downloader: staging_downloader(&fx.staging, Invocations::default()),
            converter: no_conversions(),
            device_link: absent,
        },
    )
    .await;

    let playlist = fx.playlist();
    let backlog = &playlist.failed_entities["both"];
    assert_eq!(backlog.len(), 1);
    assert_eq!(
        backlog[0].local_path(),
        Some(fx.staging.join("new.mp4").as_path())
    );
    assert!(fx.staging.join("new.mp4").exists());
    assert!(fx.out_a.join("new.mp4").exists());

    let mut present = MockDeviceLink::new();
    present.expect_discover().times(1).returning(|id: &str| {
        Ok(Some(Device {
            id: id.to_string(),
            name: "phone".to_string(),
            channel: 12,
        }))
    });
    present.expect_connect().times(1).returning(|_| Ok(()));
    present
        .expect_send()
        .times(1)
        .returning(|_, files: &[PathBuf]| files.to_vec());
    present.expect_disconnect().times(1).returning(|_| ());
    let mut downloader = MockDownloader::new();
    downloader.expect_download().never();

    let report = run_pass(
        &fx,
        Collaborators {
            feeds: feeds_returning(vec![entry("new", 1100)]),
            selector: selector(true),
            downloader,
            converter: no_conversions(),
            device_link: present,
        },
    )
    .await;

    assert_eq!(report.done, 1);
    assert_eq!(fx.playlist().backlog_len(), 0);
    assert!(!fx.staging.join("new.mp4").exists());
}

#[tokio::test]
async fn playlist_with_undefined_profile_is_skipped() {
    let fx = Fixture::new();
    fx.seed(&["to_a", "ghost"]);

    let mut feeds = MockFeedSource::new();
    feeds.expect_fetch().never();
    let mut silent = MockSelector::new();
    silent.expect_select().never();
    let mut downloader = MockDownloader::new();
    downloader.expect_download().never();

    let report = run_pass(
        &fx,
        Collaborators {
            feeds,
            selector: silent,
            downloader,
            converter: no_conversions(),
            device_link: MockDeviceLink::new(),
        },
    )
    .await;

    assert_eq!(report.skipped, 1);
    assert_eq!(fx.playlist().last_update, 1000);
}

#[tokio::test]
async fn unreachable_feed_still_retries_the_backlog() {
    let fx = Fixture::new();
    fx.seed(&["to_a"]);
    fx.store()
        .update(AUTHOR, TITLE, |p| {
            p.add_failed_entities("to_a", vec![entry("old", 900)]);
        })
        .unwrap();

    let mut feeds = MockFeedSource::new();
    feeds.expect_fetch().returning(|url: &str| {
        Err(FeedError::Fetch {
            url: url.to_string(),
            reason: "timeout".to_string(),
        })
    });
    let mut silent = MockSelector::new();
    silent.expect_select().never();

    let report = run_pass(
        &fx,
        Collaborators {
            feeds,
            selector: silent,
            downloader: staging_downloader(&fx.staging, Invocations::default()),
            converter: no_conversions(),
            device_link: MockDeviceLink::new(),
        },
    )
    .await;

    assert_eq!(report.done, 1);
    assert!(fx.out_a.join("old.mp4").exists());
    let playlist = fx.playlist();
    assert_eq!(playlist.last_update, 1000);
    assert_eq!(playlist.backlog_len(), 0);
}
