//! Compound module keys used by the course platform.
//!
//! Two layouts appear in exports:
//!
//! * `block-v1:{org}+{course}+{run}+type@{type}+block@{hex}`
//! * `i4x://{org}/{course}/{type}/{hex}` (legacy)
//!
//! Non-content pages (course info, progress, wiki) have no node in the course
//! hierarchy and are labelled with synthetic `noncontent+type@{page}` keys.

use serde::{Deserialize, Serialize};

/// Prefix of a block-v1 usage key.
const BLOCK_PREFIX: &str = "block-v1:";
/// Prefix of a course-v1 course id.
const COURSE_PREFIX: &str = "course-v1:";
/// Prefix of a legacy usage key.
const LEGACY_PREFIX: &str = "i4x://";
/// Prefix of a synthetic non-content key.
const NON_CONTENT_PREFIX: &str = "noncontent+type@";

/// Module type of a sequence (subsection) block.
pub const SEQUENTIAL: &str = "sequential";
/// Module type of a video block.
pub const VIDEO: &str = "video";

// ── ModuleKey ─────────────────────────────────────────────────────────────────

/// A parsed module key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleKey {
    /// Course locator, e.g. `MITx+6.00x+2T2017`.
    pub course: String,
    /// Block type, e.g. `problem`, `video`, `sequential`.
    pub module_type: String,
    /// Hexadecimal block identifier.
    pub hex_id: String,
}

impl ModuleKey {
    /// Parse either key layout. Returns `None` for anything else, including
    /// synthetic non-content keys.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        if let Some(rest) = key.strip_prefix(BLOCK_PREFIX) {
            let (course, rest) = rest.split_once("+type@")?;
            let (module_type, hex_id) = rest.split_once("+block@")?;
            if module_type.is_empty() || hex_id.is_empty() {
                return None;
            }
            return Some(Self {
                course: course.to_string(),
                module_type: module_type.to_string(),
                hex_id: hex_id.to_string(),
            });
        }

        if let Some(rest) = key.strip_prefix(LEGACY_PREFIX) {
            let parts: Vec<&str> = rest.split('/').collect();
            if parts.len() != 4 || parts.iter().any(|p| p.is_empty()) {
                return None;
            }
            return Some(Self {
                course: format!("{}+{}", parts[0], parts[1]),
                module_type: parts[2].to_string(),
                hex_id: parts[3].to_string(),
            });
        }

        None
    }

    /// Synthesize a block-v1 key for `hex_id` of `module_type` inside `course_id`.
    pub fn synthesize(course_id: &str, module_type: &str, hex_id: &str) -> String {
        format!(
            "{}{}+type@{}+block@{}",
            BLOCK_PREFIX,
            course_locator(course_id),
            module_type,
            hex_id
        )
    }

    pub fn is_sequential(&self) -> bool {
        self.module_type == SEQUENTIAL
    }
}

/// Reduce a course id to the locator used inside block keys.
///
/// `course-v1:MITx+6.00x+2T2017` and `MITx/6.00x/2T2017` both become
/// `MITx+6.00x+2T2017`.
pub fn course_locator(course_id: &str) -> String {
    let course_id = course_id.trim();
    match course_id.strip_prefix(COURSE_PREFIX) {
        Some(rest) => rest.to_string(),
        None => course_id.replace('/', "+"),
    }
}

// ── NonContentPage ────────────────────────────────────────────────────────────

/// Course pages that sit outside the content hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonContentPage {
    Info,
    Progress,
    Wiki,
}

impl NonContentPage {
    pub fn as_str(&self) -> &'static str {
        match self {
            NonContentPage::Info => "info",
            NonContentPage::Progress => "progress",
            NonContentPage::Wiki => "wiki",
        }
    }

    /// Detect a non-content page visit from a URL-style event type such as
    /// `/courses/course-v1:X+Y+Z/info` or `/courses/X/Y/Z/wiki/page/`.
    ///
    /// Only the segment directly after the course id names the page, so
    /// `/courses/course-v1:X+Y+Z/courseware/info/seq/` is content.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        if !event_type.starts_with('/') {
            return None;
        }
        let segments: Vec<&str> = event_type.split('/').filter(|s| !s.is_empty()).collect();
        if segments.first() != Some(&"courses") {
            return None;
        }
        // course-v1 ids take one segment, legacy org/course/run ids take three.
        let page_at = match segments.get(1) {
            Some(id) if id.starts_with(COURSE_PREFIX) => 2,
            _ => 4,
        };
        match *segments.get(page_at)? {
            "info" => Some(NonContentPage::Info),
            "progress" => Some(NonContentPage::Progress),
            "wiki" => Some(NonContentPage::Wiki),
            _ => None,
        }
    }

    /// The synthetic module key used in place of a hierarchy reference.
    pub fn module_key(&self) -> String {
        format!("{}{}", NON_CONTENT_PREFIX, self.as_str())
    }

    /// Inverse of [`NonContentPage::module_key`].
    pub fn from_module_key(key: &str) -> Option<Self> {
        match key.strip_prefix(NON_CONTENT_PREFIX)? {
            "info" => Some(NonContentPage::Info),
            "progress" => Some(NonContentPage::Progress),
            "wiki" => Some(NonContentPage::Wiki),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_parse_block_v1_key() {
        let key = format!("block-v1:MITx+6.00x+2T2017+type@problem+block@{}", HEX);
        let parsed = ModuleKey::parse(&key).unwrap();
        assert_eq!(parsed.course, "MITx+6.00x+2T2017");
        assert_eq!(parsed.module_type, "problem");
        assert_eq!(parsed.hex_id, HEX);
        assert!(!parsed.is_sequential());
    }

    #[test]
    fn test_parse_legacy_key() {
        let key = format!("i4x://MITx/6.00x/sequential/{}", HEX);
        let parsed = ModuleKey::parse(&key).unwrap();
        assert_eq!(parsed.course, "MITx+6.00x");
        assert_eq!(parsed.module_type, "sequential");
        assert!(parsed.is_sequential());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ModuleKey::parse("").is_none());
        assert!(ModuleKey::parse("block-v1:MITx+6.00x+2T2017").is_none());
        assert!(ModuleKey::parse("block-v1:X+type@+block@abc").is_none());
        assert!(ModuleKey::parse("i4x://MITx/6.00x/video").is_none());
        assert!(ModuleKey::parse("noncontent+type@info").is_none());
    }

    #[test]
    fn test_synthesize_from_course_v1_id() {
        let key = ModuleKey::synthesize("course-v1:MITx+6.00x+2T2017", VIDEO, HEX);
        assert_eq!(
            key,
            format!("block-v1:MITx+6.00x+2T2017+type@video+block@{}", HEX)
        );
        assert_eq!(ModuleKey::parse(&key).unwrap().module_type, "video");
    }

    #[test]
    fn test_course_locator_legacy_id() {
        assert_eq!(course_locator("MITx/6.00x/2T2017"), "MITx+6.00x+2T2017");
    }

    #[test]
    fn test_non_content_from_event_type() {
        assert_eq!(
            NonContentPage::from_event_type("/courses/course-v1:MITx+6.00x+2T2017/info"),
            Some(NonContentPage::Info)
        );
        assert_eq!(
            NonContentPage::from_event_type("/courses/MITx/6.00x/2T2017/progress"),
            Some(NonContentPage::Progress)
        );
        assert_eq!(
            NonContentPage::from_event_type("/courses/course-v1:X+Y+Z/wiki/X.Y.Z/intro/"),
            Some(NonContentPage::Wiki)
        );
        assert_eq!(
            NonContentPage::from_event_type("/courses/course-v1:X+Y+Z/courseware/a/b/"),
            None
        );
        assert_eq!(NonContentPage::from_event_type("play_video"), None);
    }

    #[test]
    fn test_page_name_only_after_course_id() {
        assert_eq!(
            NonContentPage::from_event_type("/courses/course-v1:X+Y+Z/courseware/info/seq1/"),
            None
        );
        assert_eq!(
            NonContentPage::from_event_type("/courses/MITx/6.00x/2T2017/courseware/wiki/seq1/"),
            None
        );
        assert_eq!(
            NonContentPage::from_event_type("/courses/MITx/6.00x/2T2017/wiki/MITx.6.00x/"),
            Some(NonContentPage::Wiki)
        );
        // A legacy id whose run is named like a page is still an id.
        assert_eq!(NonContentPage::from_event_type("/courses/MITx/6.00x/info"), None);
        assert_eq!(NonContentPage::from_event_type("/dashboard/info"), None);
    }

    #[test]
    fn test_non_content_key_round_trip() {
        for page in [
            NonContentPage::Info,
            NonContentPage::Progress,
            NonContentPage::Wiki,
        ] {
            assert_eq!(NonContentPage::from_module_key(&page.module_key()), Some(page));
        }
        assert_eq!(NonContentPage::from_module_key("noncontent+type@forum"), None);
    }
}
