//! Kubernetes version leniency.
//!
//! A cluster configured with a version outside the supported set is moved to
//! the current default instead of failing the phase.

use std::cmp::Ordering;

use crate::lab::TfvarConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSubstitution {
    pub cluster_index: usize,
    pub from: String,
    pub to: String,
}

/// Replace unsupported cluster versions with `default`, reporting each change.
pub fn reconcile_clusters(
    template: &mut TfvarConfig,
    supported: &[String],
    default: &str,
) -> Vec<VersionSubstitution> {
    let mut changes = Vec::new();
    for (i, cluster) in template.clusters_mut().enumerate() {
        if supported.iter().any(|v| v == &cluster.kubernetes_version) {
            continue;
        }
        changes.push(VersionSubstitution {
            cluster_index: i,
            from: cluster.kubernetes_version.clone(),
            to: default.to_string(),
        });
        cluster.kubernetes_version = default.to_string();
    }
    changes
}

/// Newest version in `supported`, by numeric component comparison.
pub fn newest(supported: &[String]) -> Option<String> {
    supported
        .iter()
        .max_by(|a, b| compare_versions(a, b))
        .cloned()
}

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim_start_matches('v')
            .split('.')
            .map(|part| {
                part.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    parse(a).cmp(&parse(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::KubernetesCluster;

    fn template(versions: &[&str]) -> TfvarConfig {
        TfvarConfig {
            kubernetes_clusters: Some(
                versions
                    .iter()
                    .map(|v| KubernetesCluster {
                        kubernetes_version: v.to_string(),
                        ..KubernetesCluster::default()
                    })
                    .collect(),
            ),
            ..TfvarConfig::default()
        }
    }

    fn supported() -> Vec<String> {
        vec!["1.28.5".into(), "1.29.2".into(), "1.30.1".into()]
    }

    #[test]
    fn unsupported_version_is_replaced_with_default() {
        let mut t = template(&["1.25.0", "1.29.2"]);
        let changes = reconcile_clusters(&mut t, &supported(), "1.30.1");
        assert_eq!(
            changes,
            vec![VersionSubstitution {
                cluster_index: 0,
                from: "1.25.0".into(),
                to: "1.30.1".into(),
            }]
        );
        let clusters = t.kubernetes_clusters.unwrap();
        assert_eq!(clusters[0].kubernetes_version, "1.30.1");
        assert_eq!(clusters[1].kubernetes_version, "1.29.2");
    }

    #[test]
    fn empty_version_gets_default() {
        let mut t = template(&[""]);
        let changes = reconcile_clusters(&mut t, &supported(), "1.30.1");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from, "");
    }

    #[test]
    fn no_clusters_no_changes() {
        let mut t = TfvarConfig::default();
        assert!(reconcile_clusters(&mut t, &supported(), "1.30.1").is_empty());
    }

    #[test]
    fn newest_compares_numerically() {
        let versions = vec!["1.9.10".to_string(), "1.10.2".into(), "1.10.12".into()];
        assert_eq!(newest(&versions).as_deref(), Some("1.10.12"));
        assert_eq!(newest(&[]), None);
    }
}
