use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{QueryKind, Track, TrackResolver, VideoDetails};
use crate::error::MusicError;

/// Resolves queries by shelling out to yt-dlp.
///
/// The subprocess is awaited asynchronously, so a slow lookup only parks the command
/// that issued it and never the other guilds.
pub struct YtDlpResolver {
    binary: String,
    // Limit concurrent yt-dlp processes to avoid rate limiting
    rate_limiter: Semaphore,
}

/// Subset of yt-dlp's `--dump-json` output we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    uploader: Option<String>,
    view_count: Option<u64>,
    like_count: Option<u64>,
    upload_date: Option<String>,
    description: Option<String>,
    entries: Option<Vec<YtDlpInfo>>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, concurrency: usize) -> Self {
        Self {
            binary: binary.into(),
            rate_limiter: Semaphore::new(concurrency.max(1)),
        }
    }

    /// Target argument passed to yt-dlp for a query.
    fn target(query: &str) -> String {
        match QueryKind::classify(query) {
            QueryKind::Url => query.trim().to_string(),
            QueryKind::Search => format!("ytsearch1:{}", query.trim()),
        }
    }

    /// Verifies the yt-dlp binary can be executed.
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("{} --version exited with {}", self.binary, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Runs yt-dlp for `query` and returns its stdout.
    async fn dump(&self, query: &str) -> Result<String, MusicError> {
        if query.trim().is_empty() {
            return Err(MusicError::InvalidQuery(query.to_string()));
        }

        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| MusicError::Unknown(e.into()))?;

        let target = Self::target(query);
        info!("🔍 Resolviendo con yt-dlp: {}", target);

        let output = Command::new(&self.binary)
            .args([
                "--no-playlist",
                "-f",
                "bestaudio",
                "--dump-json",
                "--no-warnings",
                &target,
            ])
            .output()
            .await
            .map_err(|e| MusicError::Unknown(anyhow::anyhow!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(query, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Track, MusicError> {
        let stdout = self.dump(query).await?;
        parse_output(query, &stdout)
    }

    async fn details(&self, query: &str) -> Result<VideoDetails, MusicError> {
        let stdout = self.dump(query).await?;
        parse_details(query, &stdout)
    }
}

fn classify_failure(query: &str, stderr: &str) -> MusicError {
    warn!("❌ yt-dlp falló para {}: {}", query, stderr.trim());

    if stderr.contains("Unsupported URL") || stderr.contains("is not a valid URL") {
        MusicError::InvalidQuery(query.to_string())
    } else if stderr.contains("Video unavailable")
        || stderr.contains("Private video")
        || stderr.contains("not available")
    {
        MusicError::NoEntry(query.to_string())
    } else {
        MusicError::Unknown(anyhow::anyhow!("yt-dlp error: {}", stderr.trim()))
    }
}

/// First JSON document yt-dlp printed, unwrapped from a search playlist if needed.
fn first_info(query: &str, stdout: &str) -> Result<YtDlpInfo, MusicError> {
    let Some(line) = stdout.lines().find(|l| !l.trim().is_empty()) else {
        return Err(MusicError::NoEntry(query.to_string()));
    };

    let mut info: YtDlpInfo = serde_json::from_str(line).map_err(|e| {
        MusicError::Unknown(anyhow::anyhow!("failed to parse yt-dlp output: {}", e))
    })?;

    // Search results can come wrapped in a playlist document
    if let Some(entries) = info.entries.take() {
        info = entries
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::NoEntry(query.to_string()))?;
    }

    Ok(info)
}

fn whole_seconds(duration: Option<f64>) -> u64 {
    duration.map(|d| d.max(0.0) as u64).unwrap_or(0)
}

/// Builds a track from the first JSON document yt-dlp printed.
fn parse_output(query: &str, stdout: &str) -> Result<Track, MusicError> {
    let info = first_info(query, stdout)?;

    let (Some(title), Some(webpage_url), Some(source_url)) = (info.title, info.webpage_url, info.url)
    else {
        return Err(MusicError::NoEntry(query.to_string()));
    };

    debug!("📊 Resuelto: {} -> {}", query, title);

    let mut track = Track::new(title, webpage_url, source_url).with_duration(whole_seconds(info.duration));
    if let Some(thumbnail) = info.thumbnail {
        track = track.with_thumbnail(thumbnail);
    }

    Ok(track)
}

fn parse_details(query: &str, stdout: &str) -> Result<VideoDetails, MusicError> {
    let info = first_info(query, stdout)?;

    let (Some(title), Some(webpage_url)) = (info.title, info.webpage_url) else {
        return Err(MusicError::NoEntry(query.to_string()));
    };

    Ok(VideoDetails {
        title,
        webpage_url,
        uploader: info.uploader,
        duration: whole_seconds(info.duration),
        views: info.view_count,
        likes: info.like_count,
        upload_date: info.upload_date,
        description: info.description.filter(|d| !d.trim().is_empty()),
        thumbnail: info.thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{"id":"XJ9XtKJHvjQ","title":"Undertale OST: 100 - Megalovania","duration":156.0,"thumbnail":"https://i.ytimg.com/vi/XJ9XtKJHvjQ/hq.jpg","webpage_url":"https://www.youtube.com/watch?v=XJ9XtKJHvjQ","url":"https://rr1.googlevideo.com/videoplayback?id=1","acodec":"opus"}"#;

    #[test]
    fn test_search_queries_use_first_result() {
        assert_eq!(YtDlpResolver::target(" lofi beats "), "ytsearch1:lofi beats");
        assert_eq!(
            YtDlpResolver::target("https://youtu.be/XJ9XtKJHvjQ"),
            "https://youtu.be/XJ9XtKJHvjQ"
        );
    }

    #[test]
    fn test_parse_output() {
        let track = parse_output("megalovania", SAMPLE).unwrap();

        assert_eq!(track.title(), "Undertale OST: 100 - Megalovania");
        assert_eq!(track.duration(), 156);
        assert_eq!(track.webpage_url(), "https://www.youtube.com/watch?v=XJ9XtKJHvjQ");
        assert_eq!(track.source_url(), "https://rr1.googlevideo.com/videoplayback?id=1");
        assert_eq!(track.thumbnail(), Some("https://i.ytimg.com/vi/XJ9XtKJHvjQ/hq.jpg"));
    }

    #[test]
    fn test_parse_output_unwraps_entries() {
        let wrapped = format!(r#"{{"title":"search","entries":[{}]}}"#, SAMPLE);
        let track = parse_output("megalovania", &wrapped).unwrap();
        assert_eq!(track.duration(), 156);
    }

    #[test]
    fn test_parse_details() {
        let sample = r#"{"title":"Undertale OST: 100 - Megalovania","uploader":"Toby Fox","duration":156.4,"view_count":123456789,"like_count":2000000,"upload_date":"20150915","description":"","webpage_url":"https://www.youtube.com/watch?v=XJ9XtKJHvjQ","thumbnail":"https://i.ytimg.com/vi/XJ9XtKJHvjQ/hq.jpg"}"#;

        let details = parse_details("megalovania", sample).unwrap();
        assert_eq!(
            details,
            VideoDetails {
                title: "Undertale OST: 100 - Megalovania".into(),
                webpage_url: "https://www.youtube.com/watch?v=XJ9XtKJHvjQ".into(),
                uploader: Some("Toby Fox".into()),
                duration: 156,
                views: Some(123456789),
                likes: Some(2000000),
                upload_date: Some("20150915".into()),
                description: None,
                thumbnail: Some("https://i.ytimg.com/vi/XJ9XtKJHvjQ/hq.jpg".into()),
            }
        );
    }

    #[test]
    fn test_details_without_stream_url() {
        // Details never need the stream URL, tracks do
        let sample = r#"{"title":"x","webpage_url":"https://www.youtube.com/watch?v=abcdefghijk"}"#;
        assert!(parse_details("x", sample).is_ok());
        assert!(matches!(parse_output("x", sample), Err(MusicError::NoEntry(_))));
    }

    #[test]
    fn test_empty_output_is_no_entry() {
        assert!(matches!(parse_output("nothing", "\n"), Err(MusicError::NoEntry(_))));
        assert!(matches!(
            parse_output("nothing", r#"{"title":"x","entries":[]}"#),
            Err(MusicError::NoEntry(_))
        ));
    }

    #[test]
    fn test_failure_classification() {
        assert!(matches!(
            classify_failure("ftp://x", "ERROR: Unsupported URL: ftp://x"),
            MusicError::InvalidQuery(_)
        ));
        assert!(matches!(
            classify_failure("q", "ERROR: [youtube] abc: Video unavailable"),
            MusicError::NoEntry(_)
        ));
        assert!(matches!(classify_failure("q", "ERROR: HTTP 429"), MusicError::Unknown(_)));
    }
}
