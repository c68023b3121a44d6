//! Recurring backups stored in the system job table.
//!
//! Each job is two lines: a tag comment carrying the job as JSON, then the
//! cron line that runs it. Lines without the tag are never touched.

use crate::models::ScheduleEntry;
use crate::remote::quote;
use crate::tools::JobTable;
use crate::utils::ScheduleError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const TAG_PREFIX: &str = "# netbackup-job ";

#[derive(Debug, Serialize, Deserialize)]
struct JobTag {
    id: u64,
    cron: String,
    source: String,
    options: String,
}

impl From<JobTag> for ScheduleEntry {
    fn from(tag: JobTag) -> Self {
        ScheduleEntry {
            job_id: tag.id,
            cron_expression: tag.cron,
            source_path: tag.source,
            option_string: tag.options,
        }
    }
}

pub struct ScheduleRegistry<T> {
    table: T,
    program: PathBuf,
}

impl<T: JobTable> ScheduleRegistry<T> {
    /// `program` is the executable the cron line invokes.
    pub fn new(table: T, program: impl Into<PathBuf>) -> Self {
        Self {
            table,
            program: program.into(),
        }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Append a job and return its ID (the current Unix time, bumped past
    /// any existing ID).
    pub async fn add(&self, source: &str, cron: &str, options: &str) -> Result<u64, ScheduleError> {
        let current = self.table.read().await?;
        let existing = parse_entries(&current);

        let mut job_id = chrono::Utc::now().timestamp().max(0) as u64;
        while existing.iter().any(|e| e.job_id == job_id) {
            job_id += 1;
        }

        let tag = JobTag {
            id: job_id,
            cron: cron.to_string(),
            source: source.to_string(),
            options: options.to_string(),
        };
        let tag_line = format!("{TAG_PREFIX}{}", serde_json::to_string(&tag)?);
        let command_line = self.command_line(cron, source, options);

        let mut table = current;
        if !table.is_empty() && !table.ends_with('\n') {
            table.push('\n');
        }
        table.push_str(&tag_line);
        table.push('\n');
        table.push_str(&command_line);
        table.push('\n');

        self.table.install(&table).await?;
        tracing::info!(job_id, cron = %cron, source = %source, "Scheduled backup installed");
        Ok(job_id)
    }

    pub async fn list(&self) -> Result<Vec<ScheduleEntry>, ScheduleError> {
        let table = self.table.read().await?;
        Ok(parse_entries(&table))
    }

    /// Drop the tagged job and its command line. An unknown ID leaves the
    /// table untouched, and a line that is not this job's command stays.
    pub async fn remove(&self, job_id: u64) -> Result<(), ScheduleError> {
        let table = self.table.read().await?;
        let lines: Vec<&str> = table.split_inclusive('\n').collect();

        let (position, tag) = lines
            .iter()
            .enumerate()
            .find_map(|(i, line)| parse_tag(line).filter(|tag| tag.id == job_id).map(|tag| (i, tag)))
            .ok_or(ScheduleError::ScheduleNotFound(job_id))?;

        // Only the command line this job installed goes with its tag
        let expected = self.command_line(&tag.cron, &tag.source, &tag.options);
        let mut end = position + 1;
        if lines.get(end).is_some_and(|line| line.trim_end() == expected) {
            end += 1;
        } else {
            tracing::warn!(job_id, "Command line for job not found, removing tag only");
        }

        let remaining: String = lines[..position]
            .iter()
            .chain(&lines[end..])
            .copied()
            .collect();

        self.table.install(&remaining).await?;
        tracing::info!(job_id, "Scheduled backup removed");
        Ok(())
    }

    fn command_line(&self, cron: &str, source: &str, options: &str) -> String {
        let program = quote(&self.program.to_string_lossy());
        let source = quote(source);
        if options.trim().is_empty() {
            format!("{cron} {program} {source}")
        } else {
            format!("{cron} {program} {} {source}", options.trim())
        }
    }
}

fn parse_tag(line: &str) -> Option<JobTag> {
    let json = line.trim_end().strip_prefix(TAG_PREFIX)?;
    match serde_json::from_str(json) {
        Ok(tag) => Some(tag),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed job tag");
            None
        }
    }
}

fn parse_entries(table: &str) -> Vec<ScheduleEntry> {
    table.lines().filter_map(parse_tag).map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeJobTable;

    const FOREIGN: &str = "# system maintenance\n0 4 * * * /usr/sbin/logrotate /etc/logrotate.conf\n";

    fn registry(table: FakeJobTable) -> ScheduleRegistry<FakeJobTable> {
        ScheduleRegistry::new(table, "/usr/local/bin/netbackup")
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let registry = registry(FakeJobTable::with(FOREIGN));
        let id = registry
            .add("/home/user/docs", "0 2 * * *", "-I -c -P")
            .await
            .unwrap();

        let table = registry.table().table();
        assert!(table.starts_with(FOREIGN));
        assert!(table.contains("0 2 * * * /usr/local/bin/netbackup -I -c -P /home/user/docs\n"));

        let entries = registry.list().await.unwrap();
        assert_eq!(
            entries,
            vec![ScheduleEntry {
                job_id: id,
                cron_expression: "0 2 * * *".into(),
                source_path: "/home/user/docs".into(),
                option_string: "-I -c -P".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_ids_do_not_collide() {
        let registry = registry(FakeJobTable::default());
        let first = registry.add("/a", "0 2 * * *", "").await.unwrap();
        let second = registry.add("/b", "0 3 * * *", "").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_source_with_spaces_is_quoted() {
        let registry = registry(FakeJobTable::default());
        registry.add("/srv/my docs", "0 2 * * 0", "-c -P").await.unwrap();
        assert!(registry.table().table().contains("-c -P '/srv/my docs'\n"));
    }

    #[tokio::test]
    async fn test_remove_keeps_foreign_lines() {
        let registry = registry(FakeJobTable::with(FOREIGN));
        let keep = registry.add("/keep", "0 1 * * *", "").await.unwrap();
        let drop = registry.add("/drop", "0 2 * * *", "").await.unwrap();

        registry.remove(drop).await.unwrap();

        let table = registry.table().table();
        assert!(table.starts_with(FOREIGN));
        assert!(!table.contains("/drop"));
        let ids: Vec<u64> = registry.list().await.unwrap().iter().map(|e| e.job_id).collect();
        assert_eq!(ids, vec![keep]);
    }

    #[tokio::test]
    async fn test_remove_unknown_id_leaves_table_unchanged() {
        let before = format!(
            "{FOREIGN}{TAG_PREFIX}{{\"id\":7,\"cron\":\"0 2 * * *\",\"source\":\"/x\",\"options\":\"\"}}\n0 2 * * * /usr/local/bin/netbackup /x"
        );
        let registry = registry(FakeJobTable::with(&before));

        let result = registry.remove(8).await;
        assert!(matches!(result, Err(ScheduleError::ScheduleNotFound(8))));
        assert_eq!(registry.table().table(), before);
        assert_eq!(registry.table().installs(), 0);

        // Last job without a trailing newline is removed cleanly
        registry.remove(7).await.unwrap();
        assert_eq!(registry.table().table(), FOREIGN);
    }

    #[tokio::test]
    async fn test_remove_keeps_foreign_line_after_orphaned_tag() {
        let table = format!(
            "{TAG_PREFIX}{{\"id\":7,\"cron\":\"0 2 * * *\",\"source\":\"/x\",\"options\":\"\"}}\n0 4 * * * /usr/sbin/logrotate /etc/logrotate.conf\n"
        );
        let registry = registry(FakeJobTable::with(&table));

        registry.remove(7).await.unwrap();
        assert_eq!(
            registry.table().table(),
            "0 4 * * * /usr/sbin/logrotate /etc/logrotate.conf\n"
        );
    }

    #[tokio::test]
    async fn test_malformed_tags_are_ignored() {
        let table = format!("{TAG_PREFIX}not json\n0 2 * * * something\n");
        let registry = registry(FakeJobTable::with(&table));
        assert!(registry.list().await.unwrap().is_empty());
    }
}
