//! Stowage - default-bucket object storage client
//!
//! Talks to any S3-compatible endpoint (MinIO, AWS S3, local emulators)
//! using settings from `stowage.toml` and `MINIO_*` environment variables.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use stowage_core::SingletonRegistry;
use stowage_s3::{ByteRange, Payload, StorageFacade, WriteOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stowage")]
#[command(about = "Object storage client with a default bucket", long_about = None)]
struct Args {
    /// Settings file (defaults to ./stowage.toml when present)
    #[arg(long, env = "STOWAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Endpoint, overriding MINIO_ENDPOINT
    #[arg(long)]
    endpoint: Option<String>,

    /// Default bucket, overriding MINIO_DEFAULT_BUCKET
    #[arg(long, env = "STOWAGE_DEFAULT_BUCKET")]
    default_bucket: Option<String>,

    /// Bucket for this command instead of the default
    #[arg(short, long, global = true)]
    bucket: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "STOWAGE_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write an object to stdout
    Get {
        key: String,
        /// First byte to read
        #[arg(long)]
        offset: Option<u64>,
        /// Number of bytes to read from the offset
        #[arg(long, requires = "offset")]
        length: Option<u64>,
    },
    /// Upload stdin as an object
    Put {
        key: String,
        #[arg(long)]
        content_type: Option<String>,
        /// Upload exactly this many bytes of stdin
        #[arg(long)]
        length: Option<u64>,
        /// User metadata as KEY=VALUE, repeatable
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },
    /// Exit 0 when the object exists, 1 when it does not
    Exists { key: String },
    /// Print object size, etag and metadata
    Stat {
        key: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a presigned download URL
    PresignGet {
        key: String,
        /// Expiry in seconds (default 7 days)
        #[arg(long)]
        expires: Option<u64>,
    },
    /// Print a presigned upload URL
    PresignPut {
        key: String,
        /// Expiry in seconds (default 7 days)
        #[arg(long)]
        expires: Option<u64>,
    },
    /// Create the default bucket if it is missing
    EnsureBucket,
    /// Save an object to a local file
    Download { key: String, path: PathBuf },
    /// Upload a local file as an object
    Upload {
        key: String,
        path: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("stowage={0},stowage_s3={0},stowage_core={0}", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = config::load(config::Overrides {
        config_file: args.config,
        endpoint: args.endpoint,
        default_bucket: args.default_bucket,
    })
    .context("failed to load storage settings")?;
    info!(endpoint = %settings.endpoint, bucket = ?settings.default_bucket, "Connecting");

    let registry = SingletonRegistry::new();
    let facade = StorageFacade::shared(&registry, settings)?;

    if !run(&facade, args.bucket.as_deref(), args.command).await? {
        std::process::exit(1);
    }
    Ok(())
}

/// Run one command; `false` means a negative answer rather than a failure
async fn run(
    facade: &StorageFacade,
    bucket: Option<&str>,
    command: Command,
) -> anyhow::Result<bool> {
    match command {
        Command::Get {
            key,
            offset,
            length,
        } => {
            let data = match offset {
                Some(offset) => {
                    let range = match length {
                        Some(length) => ByteRange::new(offset, length),
                        None => ByteRange::from_offset(offset),
                    };
                    facade.read_object_range(&key, range, bucket).await?
                }
                None => facade.read_object(&key, bucket).await?,
            };
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
        Command::Put {
            key,
            content_type,
            length,
            metadata,
        } => {
            let mut options = write_options(bucket, content_type);
            if let Some(length) = length {
                options = options.length(length);
            }
            for (k, v) in metadata {
                options = options.metadata(k, v);
            }
            let result = facade
                .write_object(&key, Payload::reader(tokio::io::stdin()), options)
                .await?;
            println!("{}", result.etag.unwrap_or_default());
        }
        Command::Exists { key } => {
            let exists = facade.object_exists(&key, bucket).await?;
            println!("{exists}");
            return Ok(exists);
        }
        Command::Stat { key, json } => {
            let info = facade.stat_object(&key, bucket).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
                return Ok(true);
            }
            println!("bucket: {}", info.bucket);
            println!("key: {}", info.key);
            println!("size: {}", info.size);
            if let Some(etag) = &info.etag {
                println!("etag: {etag}");
            }
            if let Some(modified) = info.last_modified {
                println!("last-modified: {}", modified.to_rfc3339());
            }
            if let Some(content_type) = &info.content_type {
                println!("content-type: {content_type}");
            }
            let mut metadata: Vec<_> = info.user_metadata.iter().collect();
            metadata.sort();
            for (k, v) in metadata {
                println!("meta-{k}: {v}");
            }
        }
        Command::PresignGet { key, expires } => {
            let url = facade
                .presigned_download_url(&key, bucket, expires.map(Duration::from_secs))
                .await?;
            println!("{url}");
        }
        Command::PresignPut { key, expires } => {
            let url = facade
                .presigned_upload_url(&key, bucket, expires.map(Duration::from_secs))
                .await?;
            println!("{url}");
        }
        Command::EnsureBucket => {
            let created = facade.ensure_default_bucket_exists().await?;
            let bucket = facade.default_bucket().unwrap_or_default();
            if created {
                println!("created {bucket}");
            } else {
                println!("{bucket} already exists");
            }
        }
        Command::Download { key, path } => {
            let written = facade.read_object_to_file(&key, &path, bucket).await?;
            info!(key = %key, path = %path.display(), bytes = written, "Downloaded");
        }
        Command::Upload {
            key,
            path,
            content_type,
        } => {
            let result = facade
                .write_object_from_file(&key, &path, write_options(bucket, content_type))
                .await?;
            println!("{}", result.etag.unwrap_or_default());
        }
    }
    Ok(true)
}

fn write_options(bucket: Option<&str>, content_type: Option<String>) -> WriteOptions {
    let mut options = WriteOptions::default();
    if let Some(bucket) = bucket {
        options = options.bucket(bucket);
    }
    if let Some(content_type) = content_type {
        options = options.content_type(content_type);
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;
    use stowage_s3::{EphemeralStore, ObjectStore};

    async fn facade() -> StorageFacade {
        let store = EphemeralStore::new();
        store.make_bucket("assets").await.unwrap();
        StorageFacade::new(Arc::new(store), Some("assets".to_string()))
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("owner=ops=team").unwrap(),
            ("owner".to_string(), "ops=team".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_args_parse_subcommands() {
        let args = Args::try_parse_from([
            "stowage",
            "presign-get",
            "report.pdf",
            "--expires",
            "60",
            "--bucket",
            "other",
        ])
        .unwrap();
        assert_eq!(args.bucket.as_deref(), Some("other"));
        assert!(matches!(
            args.command,
            Command::PresignGet { ref key, expires: Some(60) } if key == "report.pdf"
        ));
    }

    #[test]
    fn test_length_requires_offset() {
        let result = Args::try_parse_from(["stowage", "get", "k", "--length", "4"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_exists_reports_negative_answer() {
        let facade = facade().await;
        let found = run(&facade, None, Command::Exists { key: "missing".into() })
            .await
            .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.bin");
        let target = dir.path().join("out.bin");
        std::fs::write(&source, b"payload").unwrap();

        let facade = facade().await;
        run(
            &facade,
            None,
            Command::Upload {
                key: "blob".into(),
                path: source,
                content_type: Some("application/x-test".into()),
            },
        )
        .await
        .unwrap();

        let info = facade.stat_object("blob", None).await.unwrap();
        assert_eq!(info.content_type.as_deref(), Some("application/x-test"));

        run(&facade, None, Command::Download { key: "blob".into(), path: target.clone() })
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"payload");

        let data = facade.store().get_object("assets", "blob", None).await.unwrap();
        assert_eq!(data.into_bytes().await.unwrap(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_ensure_bucket_on_fresh_store() {
        let facade = StorageFacade::new(Arc::new(EphemeralStore::new()), Some("fresh".into()));
        assert!(run(&facade, None, Command::EnsureBucket).await.unwrap());
        assert!(facade.store().bucket_exists("fresh").await.unwrap());
    }
}
