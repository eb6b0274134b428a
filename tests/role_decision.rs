/// Integration-level coverage of the full discovery-classification-to-
/// role-decision path, combining `roles::classify` and `roles::decide_roles`
/// the way `discovery::pair_auto` chains them, across the scenario set
/// worked through in spec discussion (tagged pairs, legacy exact names,
/// plain single responders, and auxiliary combinations).
use cuebridge::config::NamingConfig;
use cuebridge::model::Candidate;
use cuebridge::roles::{self, DecisionError};

fn naming() -> NamingConfig {
    NamingConfig {
        expected_ws_main: "show_main".to_owned(),
        expected_ws_backup: "show_backup".to_owned(),
        suffix_main: "_main".to_owned(),
        suffix_backup: "_backup".to_owned(),
        suffix_aux1: "_aux1".to_owned(),
        backup_optional: true,
        aux_optional: true,
    }
}

fn classify_all(entries: &[(&str, &str, &str)]) -> Vec<Candidate> {
    let naming = naming();
    entries
        .iter()
        .map(|(ip, ws, id)| roles::classify((*ip).to_owned(), (*ws).to_owned(), (*id).to_owned(), &naming))
        .collect()
}

#[test]
fn tagged_main_and_backup_from_one_responder_pair_by_shared_base() {
    let candidates = classify_all(&[("10.0.0.1", "gala_main", "M"), ("10.0.0.1", "gala_backup", "K")]);
    let assignment = roles::decide_roles(&candidates).unwrap();
    assert_eq!(assignment.main.address, "10.0.0.1");
    assert_eq!(assignment.main.workspace_id, "M");
    assert_eq!(assignment.backup.unwrap().workspace_id, "K");
    assert!(assignment.aux.is_none());
}

#[test]
fn main_and_backup_discovered_on_separate_hosts_still_pair() {
    let candidates = classify_all(&[("10.0.0.1", "gala_main", "M"), ("10.0.0.2", "gala_backup", "K")]);
    let assignment = roles::decide_roles(&candidates).unwrap();
    assert_eq!(assignment.main.address, "10.0.0.1");
    assert_eq!(assignment.backup.unwrap().address, "10.0.0.2");
}

#[test]
fn legacy_exact_name_match_assigns_main_without_any_suffix() {
    let candidates = classify_all(&[("10.0.0.9", "show_main", "L")]);
    let assignment = roles::decide_roles(&candidates).unwrap();
    assert_eq!(assignment.main.address, "10.0.0.9");
    assert!(assignment.backup.is_none());
}

#[test]
fn single_plain_workspace_with_no_tagging_at_all_becomes_main() {
    let candidates = classify_all(&[("10.0.0.3", "MyShow", "U")]);
    let assignment = roles::decide_roles(&candidates).unwrap();
    assert_eq!(assignment.main.workspace_name, "MyShow");
    assert!(assignment.backup.is_none());
    assert!(assignment.aux.is_none());
}

#[test]
fn auxiliary_attaches_regardless_of_which_base_won() {
    let candidates = classify_all(&[
        ("10.0.0.1", "gala_main", "M"),
        ("10.0.0.1", "gala_backup", "K"),
        ("10.0.0.4", "fx_aux1", "X"),
    ]);
    let assignment = roles::decide_roles(&candidates).unwrap();
    assert_eq!(assignment.aux.unwrap().workspace_id, "X");
}

#[test]
fn empty_discovery_result_is_no_responders_not_a_conflict() {
    let candidates = classify_all(&[]);
    assert!(matches!(roles::decide_roles(&candidates), Err(DecisionError::NoResponders)));
}

#[test]
fn two_unrelated_plain_workspaces_with_no_tagged_main_is_a_conflict() {
    let candidates = classify_all(&[("10.0.0.1", "Foo", "1"), ("10.0.0.2", "Bar", "2")]);
    assert!(matches!(roles::decide_roles(&candidates), Err(DecisionError::Conflict(_))));
}

#[test]
fn role_pairs_lists_only_the_roles_actually_assigned() {
    let candidates = classify_all(&[("10.0.0.1", "gala_main", "M")]);
    let assignment = roles::decide_roles(&candidates).unwrap();
    let pairs = roles::role_pairs(&assignment);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].0, cuebridge::model::Role::Primary);
}
