//! Tests for the pattern algebra and its surface syntax.

use crate::error::PatternError;
use crate::index::FileStat;
use crate::pattern::{
    parse_pattern, DateKind, DatePattern, GroupPattern, MergeMode, NameKind, NamePattern, Pattern,
    SizePattern,
};
use crate::util::NANOS_PER_SEC;
use camino::Utf8PathBuf;

const NOW: i64 = 1_700_000_000 * NANOS_PER_SEC;

fn file(path: &str, size: u64, age_secs: i64) -> FileStat {
    let ts = NOW - age_secs * NANOS_PER_SEC;
    FileStat {
        path: Utf8PathBuf::from(path),
        size,
        modified: ts,
        accessed: ts,
        created: ts,
        inode: 1,
        device: 1,
    }
}

fn name(kind: NameKind, raw: &str) -> Pattern {
    Pattern::Name(NamePattern::new(kind, raw).unwrap())
}

fn group(children: Vec<Pattern>, inverted: bool, mode: MergeMode) -> Pattern {
    Pattern::Group(GroupPattern {
        children,
        inverted,
        mode,
    })
}

// ===========================================================================
// Leaf evaluation
// ===========================================================================

#[test]
fn extension_leaf() {
    let p = name(NameKind::Extension, ".txt");
    assert!(p.matches(&file("/d/notes.txt", 1, 0), NOW));
    assert!(!p.matches(&file("/d/notes.md", 1, 0), NOW));
    assert!(!p.matches(&file("/d/notes", 1, 0), NOW));
}

#[test]
fn extension_wildcard_means_any_extension() {
    let p = name(NameKind::Extension, ".*");
    assert!(p.matches(&file("/d/a.txt", 1, 0), NOW));
    assert!(p.matches(&file("/d/archive.tar.gz", 1, 0), NOW));
    // No dot after the first character: no extension.
    assert!(!p.matches(&file("/d/README", 1, 0), NOW));
    assert!(!p.matches(&file("/d/.bashrc", 1, 0), NOW));
}

#[test]
fn name_leaf_exact_and_star() {
    let p = name(NameKind::Name, "notes.txt");
    assert!(p.matches(&file("/d/notes.txt", 1, 0), NOW));
    assert!(!p.matches(&file("/d/other.txt", 1, 0), NOW));

    let star = name(NameKind::Name, "*");
    assert!(star.matches(&file("/d/anything", 1, 0), NOW));
}

#[test]
fn regex_leaf_is_full_match() {
    let p = name(NameKind::Regex, r"IMG_\d+\.jpg");
    assert!(p.matches(&file("/d/IMG_0042.jpg", 1, 0), NOW));
    // Substring matches do not count.
    assert!(!p.matches(&file("/d/xIMG_0042.jpg", 1, 0), NOW));
    assert!(!p.matches(&file("/d/IMG_0042.jpg.bak", 1, 0), NOW));
}

#[test]
fn bad_regex_is_rejected() {
    assert!(matches!(
        NamePattern::new(NameKind::Regex, "(unclosed"),
        Err(PatternError::BadRegex { .. })
    ));
}

#[test]
fn size_leaf_bounds_are_inclusive() {
    let p = Pattern::Size(SizePattern {
        min: Some(10),
        max: Some(100),
    });
    assert!(!p.matches(&file("/d/a", 9, 0), NOW));
    assert!(p.matches(&file("/d/a", 10, 0), NOW));
    assert!(p.matches(&file("/d/a", 100, 0), NOW));
    assert!(!p.matches(&file("/d/a", 101, 0), NOW));
}

#[test]
fn size_leaf_exact_value() {
    let p = Pattern::Size(SizePattern {
        min: Some(42),
        max: Some(42),
    });
    assert!(p.matches(&file("/d/a", 42, 0), NOW));
    assert!(!p.matches(&file("/d/a", 41, 0), NOW));
    assert!(!p.matches(&file("/d/a", 43, 0), NOW));
}

#[test]
fn date_leaf_checks_age_of_selected_timestamp() {
    let p = Pattern::Date(DatePattern {
        min: Some(60 * NANOS_PER_SEC),
        max: Some(3_600 * NANOS_PER_SEC),
        kind: DateKind::Modified,
    });
    assert!(!p.matches(&file("/d/a", 1, 30), NOW));
    assert!(p.matches(&file("/d/a", 1, 60), NOW));
    assert!(p.matches(&file("/d/a", 1, 3_600), NOW));
    assert!(!p.matches(&file("/d/a", 1, 7_200), NOW));

    // A created-kind leaf reads the created timestamp.
    let mut f = file("/d/a", 1, 30);
    f.created = NOW - 7_200 * NANOS_PER_SEC;
    let created = Pattern::Date(DatePattern {
        min: Some(3_600 * NANOS_PER_SEC),
        max: None,
        kind: DateKind::Created,
    });
    assert!(created.matches(&f, NOW));
}

// ===========================================================================
// Composite evaluation
// ===========================================================================

#[test]
fn group_all_and_any() {
    let txt = name(NameKind::Extension, ".txt");
    let small = Pattern::Size(SizePattern {
        min: None,
        max: Some(100),
    });

    let both = group(vec![txt.clone(), small.clone()], false, MergeMode::All);
    assert!(both.matches(&file("/d/a.txt", 50, 0), NOW));
    assert!(!both.matches(&file("/d/a.txt", 500, 0), NOW));

    let either = group(vec![txt, small], false, MergeMode::Any);
    assert!(either.matches(&file("/d/a.txt", 500, 0), NOW));
    assert!(either.matches(&file("/d/a.md", 50, 0), NOW));
    assert!(!either.matches(&file("/d/a.md", 500, 0), NOW));
}

#[test]
fn empty_group_semantics() {
    assert!(Pattern::match_all().matches(&file("/d/a", 1, 0), NOW));
    let none = group(vec![], false, MergeMode::Any);
    assert!(!none.matches(&file("/d/a", 1, 0), NOW));
}

#[test]
fn inverted_group() {
    let txt = name(NameKind::Extension, ".txt");
    let not_txt = group(vec![txt], true, MergeMode::All);
    assert!(!not_txt.matches(&file("/d/a.txt", 1, 0), NOW));
    assert!(not_txt.matches(&file("/d/a.md", 1, 0), NOW));
}

#[test]
fn de_morgan_consistency() {
    let p = name(NameKind::Extension, ".txt");
    let q = Pattern::Size(SizePattern {
        min: Some(100),
        max: None,
    });

    // !(p & q) == (!p | !q)
    let lhs = group(vec![p.clone(), q.clone()], true, MergeMode::All);
    let rhs = group(
        vec![
            group(vec![p.clone()], true, MergeMode::All),
            group(vec![q.clone()], true, MergeMode::All),
        ],
        false,
        MergeMode::Any,
    );

    let samples = [
        file("/d/a.txt", 50, 0),
        file("/d/a.txt", 500, 0),
        file("/d/a.md", 50, 0),
        file("/d/a.md", 500, 0),
    ];
    for sample in &samples {
        assert_eq!(lhs.matches(sample, NOW), rhs.matches(sample, NOW));
    }

    // !(p | q) == (!p & !q)
    let lhs = group(vec![p.clone(), q.clone()], true, MergeMode::Any);
    let rhs = group(
        vec![
            group(vec![p.clone()], true, MergeMode::All),
            group(vec![q], true, MergeMode::All),
        ],
        false,
        MergeMode::All,
    );
    for sample in &samples {
        assert_eq!(lhs.matches(sample, NOW), rhs.matches(sample, NOW));
    }
}

// ===========================================================================
// Surface syntax
// ===========================================================================

#[test]
fn parse_leaves() {
    assert_eq!(
        parse_pattern("['.txt']").unwrap().unwrap(),
        name(NameKind::Extension, ".txt")
    );
    assert_eq!(
        parse_pattern("['notes.txt']").unwrap().unwrap(),
        name(NameKind::Name, "notes.txt")
    );
    assert_eq!(
        parse_pattern("[/^IMG.*$/]").unwrap().unwrap(),
        name(NameKind::Regex, "^IMG.*$")
    );
}

#[test]
fn parse_size_ranges() {
    assert_eq!(
        parse_pattern("[10KB..1GB]").unwrap().unwrap(),
        Pattern::Size(SizePattern {
            min: Some(10 * 1024),
            max: Some(1 << 30),
        })
    );
    assert_eq!(
        parse_pattern("[10KB..]").unwrap().unwrap(),
        Pattern::Size(SizePattern {
            min: Some(10 * 1024),
            max: None,
        })
    );
    assert_eq!(
        parse_pattern("[..10KB]").unwrap().unwrap(),
        Pattern::Size(SizePattern {
            min: None,
            max: Some(10 * 1024),
        })
    );
    // Bare numbers are sizes in bytes.
    assert_eq!(
        parse_pattern("[10..20]").unwrap().unwrap(),
        Pattern::Size(SizePattern {
            min: Some(10),
            max: Some(20),
        })
    );
}

#[test]
fn parse_duration_ranges_default_to_modified() {
    assert_eq!(
        parse_pattern("[..8d]").unwrap().unwrap(),
        Pattern::Date(DatePattern {
            min: None,
            max: Some(8 * 86_400 * NANOS_PER_SEC),
            kind: DateKind::Modified,
        })
    );
    assert_eq!(
        parse_pattern("[0s..]").unwrap().unwrap(),
        Pattern::Date(DatePattern {
            min: Some(0),
            max: None,
            kind: DateKind::Modified,
        })
    );
}

#[test]
fn null_patterns() {
    // Ambiguous without context.
    assert_eq!(parse_pattern("[..]").unwrap(), None);
    // Minimum above maximum.
    assert_eq!(parse_pattern("[10KB..1KB]").unwrap(), None);
    assert_eq!(parse_pattern("[5s..2s]").unwrap(), None);
    // Leaves the grammar does not recognize.
    assert_eq!(parse_pattern("[10XB..]").unwrap(), None);
    assert_eq!(parse_pattern("[bogus]").unwrap(), None);
}

#[test]
fn parse_composites() {
    let p = parse_pattern("(['.txt']&[10B..])").unwrap().unwrap();
    assert_eq!(
        p,
        group(
            vec![
                name(NameKind::Extension, ".txt"),
                Pattern::Size(SizePattern {
                    min: Some(10),
                    max: None,
                }),
            ],
            false,
            MergeMode::All
        )
    );

    let p = parse_pattern("!(['a']|['b'])").unwrap().unwrap();
    assert_eq!(
        p,
        group(
            vec![name(NameKind::Name, "a"), name(NameKind::Name, "b")],
            true,
            MergeMode::Any
        )
    );
}

#[test]
fn null_children_are_dropped() {
    let p = parse_pattern("(['.txt']&[..])").unwrap().unwrap();
    assert_eq!(
        p,
        group(vec![name(NameKind::Extension, ".txt")], false, MergeMode::All)
    );
}

#[test]
fn mixed_operators_error() {
    assert!(matches!(
        parse_pattern("(['a']&['b']|['c'])"),
        Err(PatternError::MixedOperators(_))
    ));
}

#[test]
fn bare_composite_without_parens_errors() {
    assert!(matches!(
        parse_pattern("!['a']"),
        Err(PatternError::MissingParens(_))
    ));
    assert!(matches!(
        parse_pattern("abc&def"),
        Err(PatternError::MissingParens(_))
    ));
}

#[test]
fn display_round_trip() {
    let inputs = [
        "['.txt']",
        "['notes.txt']",
        "[/^IMG.*$/]",
        "[10kB..10GB]",
        "[..8d]",
        "(['.txt']&[10B..])",
        "!(['a']|['b'])",
        "((['.*'])&[10B..10GB]&[0s..])",
    ];
    for input in inputs {
        let parsed = parse_pattern(input).unwrap().unwrap();
        let shown = parsed.to_string();
        let reparsed = parse_pattern(&shown)
            .unwrap()
            .unwrap_or_else(|| panic!("{input} -> {shown} reparsed to null"));
        assert_eq!(parsed, reparsed, "round trip of {input} via {shown}");
    }
}
