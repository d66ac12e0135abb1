//! Hadoop version and classpath discovery via `hadoop version` / `hadoop classpath --glob`.

use std::path::Path;

use serde::Serialize;

use crate::error::{DmlcError, Result};
use crate::process::{Invocation, ProcessRunner};

/// First token `hadoop version` prints on a Hadoop installation.
pub const HADOOP_IDENT: &str = "Hadoop";
/// YARN arrived with Hadoop 2.
pub const MIN_SUPPORTED_MAJOR: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HadoopVersion {
    /// Version string as printed, e.g. "2.7.3"
    pub raw: String,
    pub major: u32,
}

impl HadoopVersion {
    /// Parse the first line of `hadoop version` output, e.g. `Hadoop 2.7.3`.
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let ident = tokens.next().unwrap_or("");
        if ident != HADOOP_IDENT {
            return Err(DmlcError::config(format!(
                "cannot parse hadoop version string: {:?}",
                line
            )));
        }

        let raw = tokens
            .next()
            .ok_or_else(|| DmlcError::config(format!("missing hadoop version in {:?}", line)))?;
        let major = raw
            .split('.')
            .next()
            .and_then(|m| m.parse::<u32>().ok())
            .ok_or_else(|| {
                DmlcError::config(format!("cannot parse hadoop major version from {:?}", raw))
            })?;

        Ok(Self {
            raw: raw.to_string(),
            major,
        })
    }

    pub fn is_supported(&self) -> bool {
        self.major >= MIN_SUPPORTED_MAJOR
    }
}

impl std::fmt::Display for HadoopVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", HADOOP_IDENT, self.raw)
    }
}

/// What the probe learned about the cluster runtime.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterRuntime {
    pub version: HadoopVersion,
    /// Output of `hadoop classpath --glob`. Informational only: the launch
    /// re-queries the classpath right before starting the client.
    pub classpath: String,
}

/// Query the hadoop binary for its version and classpath.
///
/// # Errors
///
/// Returns `DmlcError::Configuration` if the binary cannot be run, exits
/// non-zero for `version`, or prints something that is not a Hadoop version.
/// A version below [`MIN_SUPPORTED_MAJOR`] only logs a warning.
pub async fn probe_cluster<R: ProcessRunner>(runner: &R, hadoop: &Path) -> Result<ClusterRuntime> {
    let version_out = runner
        .output(&Invocation::new(hadoop).arg("version"))
        .await
        .map_err(|e| {
            DmlcError::config(format!("failed to run {} version: {}", hadoop.display(), e))
        })?;

    if !version_out.success {
        return Err(DmlcError::config(format!(
            "{} version exited with code {:?}: {}",
            hadoop.display(),
            version_out.code,
            version_out.stderr.trim()
        )));
    }

    let version = HadoopVersion::parse(version_out.first_line())?;
    if version.is_supported() {
        tracing::info!(version = %version.raw, "Detected Hadoop");
    } else {
        tracing::warn!(
            version = %version.raw,
            min_major = MIN_SUPPORTED_MAJOR,
            "Current Hadoop version predates YARN, submission may fail"
        );
    }

    let classpath = match runner
        .output(&Invocation::new(hadoop).args(["classpath", "--glob"]))
        .await
    {
        Ok(out) if out.success => out.stdout.trim().to_string(),
        Ok(out) => {
            tracing::warn!(code = ?out.code, "hadoop classpath --glob failed");
            String::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "hadoop classpath --glob could not be run");
            String::new()
        }
    };
    tracing::debug!(classpath_len = classpath.len(), "Probed hadoop classpath");

    Ok(ClusterRuntime { version, classpath })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hadoop_2() {
        let v = HadoopVersion::parse("Hadoop 2.7.3").unwrap();
        assert_eq!(v.raw, "2.7.3");
        assert_eq!(v.major, 2);
        assert!(v.is_supported());
        assert_eq!(v.to_string(), "Hadoop 2.7.3");
    }

    #[test]
    fn parse_hadoop_1_is_unsupported_but_valid() {
        let v = HadoopVersion::parse("Hadoop 1.2.1").unwrap();
        assert_eq!(v.major, 1);
        assert!(!v.is_supported());
    }

    #[test]
    fn parse_vendor_suffix() {
        let v = HadoopVersion::parse("Hadoop 3.1.1.3.1.4.0-315").unwrap();
        assert_eq!(v.major, 3);
    }

    #[test]
    fn parse_rejects_foreign_ident() {
        let err = HadoopVersion::parse("Spark 3.5.0").unwrap_err();
        assert!(matches!(err, DmlcError::Configuration(_)));
    }

    #[test]
    fn parse_rejects_empty_and_truncated() {
        assert!(HadoopVersion::parse("").is_err());
        assert!(HadoopVersion::parse("Hadoop").is_err());
        assert!(HadoopVersion::parse("Hadoop trunk").is_err());
    }
}
