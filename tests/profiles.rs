//! Profile discovery tests over a real temporary directory.

use gus_adapter::profiles::list_profiles;
use std::fs::File;
use std::path::Path;
use tempfile::TempDir;

fn profile_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for name in [
        "sine_test1.vsp",
        "sine_test2.vsp",
        "random_test1.vrp",
        "shock_test1.vkp",
        "datareplay_test1.vfp",
        "notes.txt",
    ] {
        File::create(dir.path().join(name)).expect("create profile");
    }
    dir
}

fn names(doc: &str) -> Vec<String> {
    doc.split("<Name>")
        .skip(1)
        .filter_map(|chunk| chunk.split("</Name>").next())
        .map(str::to_string)
        .collect()
}

#[test]
fn keyword_filters_select_the_matching_extension() {
    let dir = profile_dir();
    assert_eq!(
        names(&list_profiles(dir.path(), "sine")),
        vec!["sine_test1.vsp", "sine_test2.vsp"]
    );
    assert_eq!(
        names(&list_profiles(dir.path(), "random")),
        vec!["random_test1.vrp"]
    );
    assert_eq!(
        names(&list_profiles(dir.path(), "shock")),
        vec!["shock_test1.vkp"]
    );
    assert_eq!(
        names(&list_profiles(dir.path(), "datareplay")),
        vec!["datareplay_test1.vfp"]
    );
}

#[test]
fn keywords_are_case_insensitive() {
    let dir = profile_dir();
    for filter in ["Sine", "SINE", "sInE"] {
        assert_eq!(names(&list_profiles(dir.path(), filter)).len(), 2);
    }
}

#[test]
fn a_literal_pattern_is_used_directly() {
    let dir = profile_dir();
    assert_eq!(
        names(&list_profiles(dir.path(), "*.vsp")),
        vec!["sine_test1.vsp", "sine_test2.vsp"]
    );
    assert_eq!(
        names(&list_profiles(dir.path(), "sine_test?.vsp")).len(),
        2
    );
    assert_eq!(
        names(&list_profiles(dir.path(), "random_*.vrp")),
        vec!["random_test1.vrp"]
    );
}

#[test]
fn no_match_still_yields_a_valid_document() {
    let dir = profile_dir();
    let doc = list_profiles(dir.path(), "*.missing");
    assert!(doc.starts_with("<?xml"));
    assert!(doc.contains("<TestProfiles>"));
    assert!(doc.ends_with("</TestProfiles>"));
    assert!(names(&doc).is_empty());
}

#[test]
fn unrelated_files_are_excluded() {
    let dir = profile_dir();
    let doc = list_profiles(dir.path(), "*");
    let all = names(&doc);
    assert!(all.contains(&"notes.txt".to_string()));
    assert_eq!(names(&list_profiles(dir.path(), "*.v?p")).len(), 5);
}

#[test]
fn document_shape_wraps_each_profile_in_its_own_element() {
    let dir = profile_dir();
    let doc = list_profiles(dir.path(), "shock");
    assert!(doc.contains("<Profile><Name>shock_test1.vkp</Name></Profile>"));
}

#[test]
fn missing_directory_is_not_an_error() {
    let doc = list_profiles(Path::new("/definitely/not/here"), "sine");
    assert!(names(&doc).is_empty());
    assert!(doc.contains("TestProfiles"));
}
