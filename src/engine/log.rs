use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::directory::{PartitionId, Partitioner};

/// One entry of a topic partition. `value: None` is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: Option<String>,
}

impl Record {
    pub fn new(key: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            key: key.into(),
            value: value.map(str::to_string),
        }
    }
}

/// A topic stored as `{log_dir}/{topic}/{partition}.log`, one JSON record per line.
#[derive(Debug, Clone)]
pub struct TopicLog {
    topic: String,
    topic_dir: PathBuf,
    partitioner: Partitioner,
}

impl TopicLog {
    pub fn new(log_dir: impl AsRef<Path>, topic: &str, num_partitions: u32) -> Self {
        Self {
            topic: topic.to_string(),
            topic_dir: log_dir.as_ref().join(topic),
            partitioner: Partitioner::new(num_partitions),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    pub fn partition_path(&self, partition: PartitionId) -> PathBuf {
        self.topic_dir.join(format!("{}.log", partition))
    }

    /// Appends a record to the partition its key hashes to.
    pub async fn append(&self, key: &str, value: Option<&str>) -> Result<PartitionId> {
        let partition = self.partitioner.partition_for(key);
        let mut line = serde_json::to_vec(&Record::new(key, value))?;
        line.push(b'\n');

        fs::create_dir_all(&self.topic_dir)
            .await
            .with_context(|| format!("creating {}", self.topic_dir.display()))?;

        let path = self.partition_path(partition);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(partition)
    }

    /// Reads the complete records written after byte `offset`.
    ///
    /// Returns the records and the offset to continue from. A trailing line
    /// without its newline is left for the next read. A partition nobody has
    /// written to yet reads as empty.
    pub async fn read_from(&self, partition: PartitionId, offset: u64) -> Result<(Vec<Record>, u64)> {
        let path = self.partition_path(partition);
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), offset)),
            Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
        };

        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;

        let Some(end) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok((Vec::new(), offset));
        };

        let mut records = Vec::new();
        for line in buf[..end].split(|&b| b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Record>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "Skipping malformed record in {} partition {}: {}",
                    self.topic,
                    partition,
                    e
                ),
            }
        }

        Ok((records, offset + end as u64 + 1))
    }
}
