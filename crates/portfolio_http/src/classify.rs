//! Pure, Axum-agnostic classification of a `/v2/...` request path.
//!
//! Distribution-spec paths embed a repository name of unbounded segment count in the middle of
//! the URL (`/v2/<name>/manifests/<reference>`), which does not fit Axum's static path-parameter
//! matching. Instead the router in [`crate::lib`] mounts a single catch-all (`/v2/*rest`) and
//! hands the remainder to [`classify`], which is a plain function over string slices and is
//! unit-tested in isolation from any HTTP machinery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified<'a> {
    Manifest { repo: String, target: &'a str },
    Tags { repo: String },
    Catalog,
    Referrers { repo: String, digest: &'a str },
    Unmatched,
}

/// Classify a request path already split on `/` with the leading empty segment dropped (i.e.
/// everything after the root, plus the `v2` segment itself as `segments[0]`).
///
/// Parsing is purely syntactic; it does not validate that `repo` exists.
pub fn classify<'a>(segments: &[&'a str]) -> Classified<'a> {
    if segments.len() >= 2 && *segments.last().unwrap() == "_catalog" {
        return Classified::Catalog;
    }

    if segments.len() >= 4 {
        let penultimate = segments[segments.len() - 2];
        let last = segments[segments.len() - 1];
        let repo_segments = &segments[1..segments.len() - 2];

        if !repo_segments.is_empty() {
            let repo = repo_segments.join("/");
            match penultimate {
                "manifests" => {
                    return Classified::Manifest {
                        repo,
                        target: last,
                    };
                }
                "tags" if last == "list" => {
                    return Classified::Tags { repo };
                }
                "referrers" => {
                    return Classified::Referrers {
                        repo,
                        digest: last,
                    };
                }
                _ => {}
            }
        }
    }

    Classified::Unmatched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }

    #[test]
    fn classifies_manifest() {
        let segments = split("/v2/acme/app/manifests/latest");
        assert_eq!(
            classify(&segments),
            Classified::Manifest {
                repo: "acme/app".to_string(),
                target: "latest",
            }
        );
    }

    #[test]
    fn classifies_manifest_with_digest_target() {
        let segments = split("/v2/acme/app/manifests/sha256:deadbeef");
        assert_eq!(
            classify(&segments),
            Classified::Manifest {
                repo: "acme/app".to_string(),
                target: "sha256:deadbeef",
            }
        );
    }

    #[test]
    fn classifies_tags_list() {
        let segments = split("/v2/acme/app/tags/list");
        assert_eq!(
            classify(&segments),
            Classified::Tags {
                repo: "acme/app".to_string(),
            }
        );
    }

    #[test]
    fn tags_requires_list_suffix() {
        let segments = split("/v2/acme/app/tags/other");
        assert_eq!(classify(&segments), Classified::Unmatched);
    }

    #[test]
    fn classifies_catalog() {
        let segments = split("/v2/_catalog");
        assert_eq!(classify(&segments), Classified::Catalog);
    }

    #[test]
    fn classifies_referrers() {
        let segments = split("/v2/acme/app/referrers/sha256:deadbeef");
        assert_eq!(
            classify(&segments),
            Classified::Referrers {
                repo: "acme/app".to_string(),
                digest: "sha256:deadbeef",
            }
        );
    }

    #[test]
    fn multi_segment_repo_name_joins_correctly() {
        let segments = split("/v2/acme/team/service/manifests/v1");
        assert_eq!(
            classify(&segments),
            Classified::Manifest {
                repo: "acme/team/service".to_string(),
                target: "v1",
            }
        );
    }

    #[test]
    fn too_short_falls_through() {
        let segments = split("/v2/manifests/latest");
        assert_eq!(classify(&segments), Classified::Unmatched);
    }

    #[test]
    fn bare_version_root_falls_through() {
        let segments = split("/v2");
        assert_eq!(classify(&segments), Classified::Unmatched);
    }
}
