//! Candidate classification and deterministic role assignment.

use crate::config::NamingConfig;
use crate::model::{Candidate, CandidateKind, LEGACY_BASE, Role};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("discovery completed with zero parseable workspaces")]
    NoResponders,
    #[error("ambiguous role assignment: {0}")]
    Conflict(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedEndpoint {
    pub address: String,
    pub workspace_name: String,
    pub workspace_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub main: AssignedEndpoint,
    pub backup: Option<AssignedEndpoint>,
    pub aux: Option<AssignedEndpoint>,
}

/// Classifies a single discovered `(address, workspace name, workspace id)`
/// by suffix, per `spec.md` §4.6.
pub fn classify(address: String, ws_name: String, ws_id: String, naming: &NamingConfig) -> Candidate {
    if let Some(base) = ws_name.strip_suffix(&naming.suffix_main) {
        return Candidate {
            address,
            ws_name: ws_name.clone(),
            ws_id,
            kind: CandidateKind::PrimaryTagged,
            base: base.to_owned(),
        };
    }
    if let Some(base) = ws_name.strip_suffix(&naming.suffix_backup) {
        return Candidate {
            address,
            ws_name: ws_name.clone(),
            ws_id,
            kind: CandidateKind::BackupTagged,
            base: base.to_owned(),
        };
    }
    if let Some(base) = ws_name.strip_suffix(&naming.suffix_aux1) {
        return Candidate {
            address,
            ws_name: ws_name.clone(),
            ws_id,
            kind: CandidateKind::AuxiliaryTagged,
            base: base.to_owned(),
        };
    }
    if ws_name == naming.expected_ws_main {
        return Candidate {
            address,
            ws_name: ws_name.clone(),
            ws_id,
            kind: CandidateKind::PrimaryTagged,
            base: LEGACY_BASE.to_owned(),
        };
    }
    if ws_name == naming.expected_ws_backup {
        return Candidate {
            address,
            ws_name: ws_name.clone(),
            ws_id,
            kind: CandidateKind::BackupTagged,
            base: LEGACY_BASE.to_owned(),
        };
    }
    let base = ws_name.clone();
    Candidate {
        address,
        ws_name,
        ws_id,
        kind: CandidateKind::Plain,
        base,
    }
}

fn as_assigned(c: &Candidate) -> AssignedEndpoint {
    AssignedEndpoint {
        address: c.address.clone(),
        workspace_name: c.ws_name.clone(),
        workspace_id: c.ws_id.clone(),
    }
}

/// Deterministic role assignment from a set of classified candidates.
/// See `spec.md` §4.6 for the algorithm this implements step for step.
pub fn decide_roles(candidates: &[Candidate]) -> Result<Assignment, DecisionError> {
    // Step 1: auxiliary.
    let aux_cands: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.kind == CandidateKind::AuxiliaryTagged)
        .collect();
    if aux_cands.len() > 1 {
        return Err(DecisionError::Conflict(
            "more than one auxiliary candidate".to_owned(),
        ));
    }
    let aux = aux_cands.first().map(|c| as_assigned(c));

    // Step 2: group primary/backup candidates by base.
    let mut by_base: HashMap<&str, (Vec<&Candidate>, Vec<&Candidate>)> = HashMap::new();
    for c in candidates {
        match c.kind {
            CandidateKind::PrimaryTagged => by_base.entry(&c.base).or_default().0.push(c),
            CandidateKind::BackupTagged => by_base.entry(&c.base).or_default().1.push(c),
            _ => {}
        }
    }
    for (base, (primaries, backups)) in &by_base {
        if primaries.len() > 1 {
            return Err(DecisionError::Conflict(format!(
                "two primary-tagged candidates share base '{base}'"
            )));
        }
        if backups.len() > 1 {
            return Err(DecisionError::Conflict(format!(
                "two backup-tagged candidates share base '{base}'"
            )));
        }
    }

    // Step 3: prefer a base with both primary and backup.
    let mut both_bases: Vec<&str> = by_base
        .iter()
        .filter(|(_, (p, b))| !p.is_empty() && !b.is_empty())
        .map(|(base, _)| *base)
        .collect();
    both_bases.sort_unstable();

    if let Some(&chosen) = both_bases.first() {
        if both_bases.len() > 1 {
            warn!(
                bases = ?both_bases,
                chosen,
                "multiple primary+backup-matched bases discovered, picking lexicographically smallest"
            );
        }
        let (primaries, backups) = &by_base[chosen];
        return Ok(Assignment {
            main: as_assigned(primaries[0]),
            backup: backups.first().map(|c| as_assigned(c)),
            aux,
        });
    }

    // Step 4: exactly one base with a primary and no backup.
    let primary_only_bases: Vec<&str> = by_base
        .iter()
        .filter(|(_, (p, b))| !p.is_empty() && b.is_empty())
        .map(|(base, _)| *base)
        .collect();
    if primary_only_bases.len() > 1 {
        return Err(DecisionError::Conflict(
            "more than one unmatched primary-tagged base".to_owned(),
        ));
    }
    if let Some(&chosen) = primary_only_bases.first() {
        let (primaries, _) = &by_base[chosen];
        return Ok(Assignment {
            main: as_assigned(primaries[0]),
            backup: None,
            aux,
        });
    }

    // Step 5: no tagged primary anywhere — fall back to plain candidates.
    let plains: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.kind == CandidateKind::Plain)
        .collect();
    match plains.len() {
        0 => Err(DecisionError::NoResponders),
        1 => Ok(Assignment {
            main: as_assigned(plains[0]),
            backup: None,
            aux,
        }),
        _ => Err(DecisionError::Conflict(
            "more than one plain workspace and no tagged primary".to_owned(),
        )),
    }
}

/// Turns an `Assignment` entry into its persisted-role pairing.
pub fn role_pairs(assignment: &Assignment) -> Vec<(Role, &AssignedEndpoint)> {
    let mut pairs = vec![(Role::Primary, &assignment.main)];
    if let Some(backup) = &assignment.backup {
        pairs.push((Role::Backup, backup));
    }
    if let Some(aux) = &assignment.aux {
        pairs.push((Role::Auxiliary, aux));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn cand(addr: &str, ws_name: &str, ws_id: &str) -> Candidate {
        classify(addr.to_owned(), ws_name.to_owned(), ws_id.to_owned(), &naming())
    }

    #[test]
    fn scenario_one_legacy_main_and_backup() {
        let cands = vec![
            cand("10.0.0.1", "show_main", "A"),
            cand("10.0.0.2", "show_backup", "B"),
        ];
        let assignment = decide_roles(&cands).unwrap();
        assert_eq!(assignment.main.address, "10.0.0.1");
        assert_eq!(assignment.main.workspace_id, "A");
        assert_eq!(assignment.backup.unwrap().address, "10.0.0.2");
        assert!(assignment.aux.is_none());
    }

    #[test]
    fn scenario_two_conflicting_legacy_mains() {
        let cands = vec![
            cand("10.0.0.1", "show_main", "A"),
            cand("10.0.0.2", "show_main", "B"),
        ];
        assert_eq!(
            decide_roles(&cands).unwrap_err(),
            DecisionError::Conflict(format!(
                "two primary-tagged candidates share base '{LEGACY_BASE}'"
            ))
        );
    }

    #[test]
    fn scenario_three_single_plain_workspace() {
        let cands = vec![cand("10.0.0.3", "ShowUnique", "U")];
        let assignment = decide_roles(&cands).unwrap();
        assert_eq!(assignment.main.address, "10.0.0.3");
        assert!(assignment.backup.is_none());
        assert!(assignment.aux.is_none());
    }

    #[test]
    fn scenario_four_tagged_base_plus_auxiliary() {
        let cands = vec![
            cand("10.0.0.1", "gala_main", "M"),
            cand("10.0.0.1", "gala_backup", "K"),
            cand("10.0.0.4", "fx_aux1", "X"),
        ];
        let assignment = decide_roles(&cands).unwrap();
        assert_eq!(assignment.main.workspace_name, "gala_main");
        assert_eq!(assignment.backup.unwrap().workspace_name, "gala_backup");
        assert_eq!(assignment.aux.unwrap().workspace_name, "fx_aux1");
    }

    #[test]
    fn no_candidates_is_no_responders() {
        assert_eq!(decide_roles(&[]).unwrap_err(), DecisionError::NoResponders);
    }

    #[test]
    fn two_plains_and_no_tagged_primary_is_conflict() {
        let cands = vec![cand("10.0.0.1", "A", "1"), cand("10.0.0.2", "B", "2")];
        assert!(matches!(decide_roles(&cands), Err(DecisionError::Conflict(_))));
    }

    #[test]
    fn two_auxiliary_candidates_is_conflict() {
        let cands = vec![
            cand("10.0.0.1", "show_aux1", "1"),
            cand("10.0.0.2", "fx_aux1", "2"),
        ];
        assert!(matches!(decide_roles(&cands), Err(DecisionError::Conflict(_))));
    }

    #[test]
    fn multiple_matched_bases_picks_lexicographically_smallest() {
        let cands = vec![
            cand("10.0.0.1", "zeta_main", "1"),
            cand("10.0.0.2", "zeta_backup", "2"),
            cand("10.0.0.3", "alpha_main", "3"),
            cand("10.0.0.4", "alpha_backup", "4"),
        ];
        let assignment = decide_roles(&cands).unwrap();
        assert_eq!(assignment.main.workspace_name, "alpha_main");
        assert_eq!(assignment.backup.unwrap().workspace_name, "alpha_backup");
    }
}
