//! Path sanitisation, symlink policy, and resource-ceiling enforcement
//! (SPEC_FULL.md §4.5). None of this module touches the filesystem — it only
//! classifies paths and running totals against a [`SecurityPolicy`].

use crate::error::{Context, ErrorKind, ExtractError, Result};

const DEFAULT_MAX_PATH_LEN: usize = 4096;

/// How symlink (and hardlink) entries are treated during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkPolicy {
    Disallow,
    AllowInsideRoot,
    AllowAny,
}

impl Default for SymlinkPolicy {
    fn default() -> Self {
        SymlinkPolicy::Disallow
    }
}

/// Everything the security layer needs to judge a path or a running total.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    pub allow_absolute_paths: bool,
    pub allow_path_traversal: bool,
    pub symlink_policy: SymlinkPolicy,
    pub allow_symlink_escape: bool,
    pub allow_absolute_symlink: bool,
    pub max_single_file_size: u64,
    pub max_total_extracted_size: u64,
    pub max_compression_ratio: f64,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        SecurityPolicy {
            allow_absolute_paths: false,
            allow_path_traversal: false,
            symlink_policy: SymlinkPolicy::Disallow,
            allow_symlink_escape: false,
            allow_absolute_symlink: false,
            max_single_file_size: 10 * 1024 * 1024 * 1024,
            max_total_extracted_size: 10 * 1024 * 1024 * 1024,
            max_compression_ratio: 100.0,
        }
    }
}

/// A path that has passed [`sanitise`]: relative, `.`/empty-component-free,
/// and guaranteed not to walk above the extraction root (unless the policy
/// explicitly allows it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePath(String);

impl SafePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

fn looks_absolute(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    // Windows drive-letter form: "C:\" or "C:/".
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Splits `path` on `/`, drops `.` and empty components, and walks `..`
/// against a depth counter. Returns the resolved component list; the counter
/// never drops below zero unless `allow_traversal` is set, in which case the
/// offending `..` is kept verbatim (the caller asked for it).
fn resolve_components(
    path: &str,
    allow_traversal: bool,
    escape_kind: ErrorKind,
    ctx: &Context,
) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    let mut depth: i64 = 0;

    for comp in path.split('/') {
        match comp {
            "" | "." => continue,
            ".." => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if allow_traversal {
                    out.push("..".to_string());
                    depth -= 1;
                } else {
                    return Err(ExtractError::security(
                        escape_kind,
                        ctx.clone(),
                        format!("path {path:?} escapes the extraction root"),
                    ));
                }
            }
            other => {
                out.push(other.to_string());
                depth += 1;
            }
        }
    }

    Ok(out)
}

/// Validates and canonicalises an entry path per SPEC_FULL.md §4.5 steps 1-4.
pub fn sanitise(path: &str, policy: &SecurityPolicy, ctx: &Context) -> Result<SafePath> {
    if path.is_empty() {
        return Err(ExtractError::security(ErrorKind::EmptyPath, ctx.clone(), "entry path is empty"));
    }
    if path.as_bytes().contains(&0) {
        return Err(ExtractError::security(
            ErrorKind::NullByteInPath,
            ctx.clone(),
            "entry path contains a NUL byte",
        ));
    }
    if path.len() > DEFAULT_MAX_PATH_LEN {
        return Err(ExtractError::security(
            ErrorKind::PathTooLong,
            ctx.clone(),
            format!("entry path is {} bytes, exceeds {DEFAULT_MAX_PATH_LEN}", path.len()),
        ));
    }
    if looks_absolute(path) && !policy.allow_absolute_paths {
        return Err(ExtractError::security(
            ErrorKind::AbsolutePathNotAllowed,
            ctx.clone(),
            format!("entry path {path:?} is absolute"),
        ));
    }

    let components = resolve_components(path, policy.allow_path_traversal, ErrorKind::PathTraversalAttempt, ctx)?;
    Ok(SafePath(components.join("/")))
}

/// Resolves a hardlink's target (an archive-relative path naming another
/// member, unlike a symlink's filesystem-relative text) against the policy.
/// Escapes are reported as `SymlinkEscapeAttempt`, per the Open Question
/// resolution in SPEC_FULL.md §9: hardlinks escaping the root are treated
/// identically to symlinks that do.
pub fn resolve_hardlink_target(
    link_target: &str,
    policy: &SecurityPolicy,
    ctx: &Context,
) -> Result<SafePath> {
    if policy.symlink_policy == SymlinkPolicy::Disallow {
        return Err(ExtractError::security(
            ErrorKind::SymlinkNotAllowed,
            ctx.clone(),
            "hardlink entries are disallowed by policy",
        ));
    }
    if looks_absolute(link_target) {
        if !policy.allow_absolute_symlink {
            return Err(ExtractError::security(
                ErrorKind::AbsoluteSymlinkNotAllowed,
                ctx.clone(),
                format!("hardlink target {link_target:?} is absolute"),
            ));
        }
        let trimmed = link_target.trim_start_matches(['/', '\\']);
        return Ok(SafePath(trimmed.to_string()));
    }

    let components = resolve_components(
        link_target,
        policy.allow_symlink_escape,
        ErrorKind::SymlinkEscapeAttempt,
        ctx,
    )?;
    Ok(SafePath(components.join("/")))
}

/// Validates a symlink/hardlink target against the policy, given the
/// already-sanitised path of the entry that owns the link.
pub fn check_link_target(
    link_target: &str,
    entry_path: &SafePath,
    policy: &SecurityPolicy,
    ctx: &Context,
) -> Result<()> {
    if policy.symlink_policy == SymlinkPolicy::Disallow {
        return Err(ExtractError::security(
            ErrorKind::SymlinkNotAllowed,
            ctx.clone(),
            "symlink/hardlink entries are disallowed by policy",
        ));
    }

    if looks_absolute(link_target) {
        if !policy.allow_absolute_symlink {
            return Err(ExtractError::security(
                ErrorKind::AbsoluteSymlinkNotAllowed,
                ctx.clone(),
                format!("link target {link_target:?} is absolute"),
            ));
        }
        return Ok(());
    }

    if policy.symlink_policy == SymlinkPolicy::AllowAny {
        return Ok(());
    }

    // AllowInsideRoot: resolve the target relative to the entry's parent
    // directory and confirm it never walks above the root.
    let parent_depth = entry_path
        .as_str()
        .rsplit_once('/')
        .map(|(parent, _)| parent.split('/').filter(|c| !c.is_empty()).count())
        .unwrap_or(0) as i64;

    let mut depth = parent_depth;
    for comp in link_target.split('/') {
        match comp {
            "" | "." => continue,
            ".." => depth -= 1,
            _ => depth += 1,
        }
        if depth < 0 {
            if policy.allow_symlink_escape {
                return Ok(());
            }
            return Err(ExtractError::security(
                ErrorKind::SymlinkEscapeAttempt,
                ctx.clone(),
                format!("link target {link_target:?} resolves outside the extraction root"),
            ));
        }
    }

    Ok(())
}

/// Single-entry size cap, checked before any body bytes are read.
pub fn check_single_file_size(declared_size: u64, policy: &SecurityPolicy, ctx: &Context) -> Result<()> {
    if declared_size > policy.max_single_file_size {
        return Err(ExtractError::resource(
            ErrorKind::FileSizeExceedsLimit,
            ctx.clone(),
            format!(
                "declared size {declared_size} exceeds the {}-byte single-file limit",
                policy.max_single_file_size
            ),
        ));
    }
    Ok(())
}

/// Running-total zip-bomb defences: checked incrementally as bytes are
/// written and as compressed input is consumed (SPEC_FULL.md §4.5).
const RATIO_CHECK_FLOOR: u64 = 1024 * 1024;

pub fn check_running_totals(
    total_written: u64,
    compressed_consumed: u64,
    policy: &SecurityPolicy,
    ctx: &Context,
) -> Result<()> {
    if total_written > policy.max_total_extracted_size {
        return Err(ExtractError::resource(
            ErrorKind::TotalSizeExceedsLimit,
            ctx.clone(),
            format!(
                "total extracted bytes {total_written} exceeds the {}-byte limit",
                policy.max_total_extracted_size
            ),
        ));
    }

    if compressed_consumed >= RATIO_CHECK_FLOOR {
        let ratio = total_written as f64 / compressed_consumed as f64;
        if ratio > policy.max_compression_ratio {
            return Err(ExtractError::resource(
                ErrorKind::SuspiciousCompressionRatio,
                ctx.clone(),
                format!(
                    "compression ratio {ratio:.1} exceeds the configured limit of {}",
                    policy.max_compression_ratio
                ),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new()
    }

    #[test]
    fn plain_relative_path_passes_through() {
        let policy = SecurityPolicy::default();
        let safe = sanitise("a/b/c.txt", &policy, &ctx()).unwrap();
        assert_eq!(safe.as_str(), "a/b/c.txt");
    }

    #[test]
    fn dot_components_are_dropped() {
        let policy = SecurityPolicy::default();
        let safe = sanitise("./a/./b", &policy, &ctx()).unwrap();
        assert_eq!(safe.as_str(), "a/b");
    }

    #[test]
    fn traversal_above_root_is_rejected_by_default() {
        let policy = SecurityPolicy::default();
        let err = sanitise("../../../etc/passwd", &policy, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTraversalAttempt);
    }

    #[test]
    fn traversal_that_stays_inside_is_allowed() {
        let policy = SecurityPolicy::default();
        let safe = sanitise("a/b/../c", &policy, &ctx()).unwrap();
        assert_eq!(safe.as_str(), "a/c");
    }

    #[test]
    fn traversal_allowed_when_policy_permits() {
        let mut policy = SecurityPolicy::default();
        policy.allow_path_traversal = true;
        let safe = sanitise("../escape", &policy, &ctx()).unwrap();
        assert_eq!(safe.as_str(), "../escape");
    }

    #[test]
    fn absolute_path_rejected_by_default() {
        let policy = SecurityPolicy::default();
        let err = sanitise("/etc/passwd", &policy, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AbsolutePathNotAllowed);
    }

    #[test]
    fn empty_and_nul_paths_rejected() {
        let policy = SecurityPolicy::default();
        assert_eq!(sanitise("", &policy, &ctx()).unwrap_err().kind(), ErrorKind::EmptyPath);
        assert_eq!(
            sanitise("a\0b", &policy, &ctx()).unwrap_err().kind(),
            ErrorKind::NullByteInPath
        );
    }

    #[test]
    fn symlink_disallowed_by_default() {
        let policy = SecurityPolicy::default();
        let entry_path = SafePath("dir/link".to_string());
        let err = check_link_target("target", &entry_path, &policy, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SymlinkNotAllowed);
    }

    #[test]
    fn symlink_escape_detected_inside_root_policy() {
        let mut policy = SecurityPolicy::default();
        policy.symlink_policy = SymlinkPolicy::AllowInsideRoot;
        let entry_path = SafePath("a/link".to_string());
        let err = check_link_target("../../escape", &entry_path, &policy, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SymlinkEscapeAttempt);
    }

    #[test]
    fn symlink_staying_inside_root_is_allowed() {
        let mut policy = SecurityPolicy::default();
        policy.symlink_policy = SymlinkPolicy::AllowInsideRoot;
        let entry_path = SafePath("a/b/link".to_string());
        check_link_target("../sibling", &entry_path, &policy, &ctx()).unwrap();
    }

    #[test]
    fn absolute_symlink_rejected_unless_allowed() {
        let mut policy = SecurityPolicy::default();
        policy.symlink_policy = SymlinkPolicy::AllowInsideRoot;
        let entry_path = SafePath("link".to_string());
        let err = check_link_target("/etc/passwd", &entry_path, &policy, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AbsoluteSymlinkNotAllowed);

        policy.allow_absolute_symlink = true;
        check_link_target("/etc/passwd", &entry_path, &policy, &ctx()).unwrap();
    }

    #[test]
    fn single_file_size_ceiling() {
        let mut policy = SecurityPolicy::default();
        policy.max_single_file_size = 100;
        check_single_file_size(100, &policy, &ctx()).unwrap();
        let err = check_single_file_size(101, &policy, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileSizeExceedsLimit);
    }

    #[test]
    fn total_size_ceiling() {
        let mut policy = SecurityPolicy::default();
        policy.max_total_extracted_size = 1000;
        check_running_totals(1000, 0, &policy, &ctx()).unwrap();
        let err = check_running_totals(1001, 0, &policy, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TotalSizeExceedsLimit);
    }

    #[test]
    fn compression_ratio_ceiling_only_trips_past_the_floor() {
        let mut policy = SecurityPolicy::default();
        policy.max_total_extracted_size = u64::MAX;
        policy.max_compression_ratio = 10.0;
        // Below the 1 MiB consumed floor: not checked yet, even at absurd ratios.
        check_running_totals(100 * 1024 * 1024, 1024, &policy, &ctx()).unwrap();
        // Past the floor, ratio 100 trips a limit of 10.
        let err = check_running_totals(100 * 1024 * 1024, 1024 * 1024, &policy, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SuspiciousCompressionRatio);
    }
}
