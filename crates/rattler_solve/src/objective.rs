//! The seven-tier objective from spec `§4.4`: each tier is minimised in
//! turn, with the value the previous tier achieved locked in as a hard
//! constraint before the next tier gets to optimise over whatever freedom
//! remains. This mirrors `conda`'s `Resolve.solve()`, which calls
//! `minimize()` once per tier and folds each result back into the clause
//! set via an equality constraint.

use ahash::AHashMap;
use rattler_conda_types::{MatchSpec, PackageName, RepoDataRecord};
use rattler_sat::{Clauses, DpllBackend, Lit, ObjectiveTerm, Polarity, Value};

/// A candidate together with the bookkeeping the objective tiers need:
/// its SAT literal and the rank of the channel it came from.
pub(crate) struct NamedCandidate<'a> {
    pub(crate) lit: Lit,
    pub(crate) record: &'a RepoDataRecord,
    pub(crate) channel_rank: usize,
}

/// The model chosen after all seven tiers have been minimised.
pub(crate) struct ObjectiveResult {
    pub(crate) solution: Vec<bool>,
}

/// Runs every tier in order, fixing each tier's optimum before moving to
/// the next so that later tiers only break ties among solutions that are
/// already optimal for every earlier one.
pub(crate) fn minimize(
    clauses: &mut Clauses,
    candidates: &[NamedCandidate],
    locked: &[RepoDataRecord],
    _pinned: &[RepoDataRecord],
    specs: &[MatchSpec],
    extra_latest_names: &[PackageName],
) -> ObjectiveResult {
    let mut bestsol: Option<Vec<bool>> = None;

    // Tier 1 — forbid removal of explicitly requested packages. The
    // resolver's hard `Any(candidates matching spec)` clauses already force
    // some candidate satisfying every explicit spec to be selected, so this
    // tier has no remaining freedom to optimise: the invariant is enforced
    // structurally rather than through the objective.

    // Tier 2 — minimise the number of track-features removed from the
    // current state: for every feature some locked package advertises, pay
    // a cost of 1 unless a selected candidate still advertises it.
    let mut track_feature_holders: AHashMap<&str, Vec<Lit>> = AHashMap::new();
    for candidate in candidates {
        for feature in &candidate.record.package_record.track_features {
            track_feature_holders
                .entry(feature.as_str())
                .or_default()
                .push(candidate.lit);
        }
    }
    let locked_features: Vec<&str> = locked
        .iter()
        .flat_map(|l| l.package_record.track_features.iter().map(String::as_str))
        .collect();
    let mut tier2 = Vec::new();
    for feature in dedup(locked_features) {
        let Some(holders) = track_feature_holders.get(feature) else {
            continue;
        };
        let any_holder = clauses.any(holders.iter().map(|&l| Value::Lit(l)), Polarity::Both);
        if let Value::Lit(l) = any_holder {
            // Cost 1 when the feature ends up with no holder, i.e. the gate
            // is false: tax the negated literal.
            tier2.push((1i64, -l));
        }
    }
    bestsol = run_tier(clauses, tier2, bestsol);

    // Tier 3 — prefer the latest version for each explicitly requested
    // name: among that name's candidates sorted newest-first, the
    // coefficient is the candidate's rank in that order (0 for newest).
    let mut explicit_names: Vec<&PackageName> = specs.iter().filter_map(exact_name).collect();
    explicit_names.extend(extra_latest_names);
    let mut tier3 = Vec::new();
    for name in dedup_names(&explicit_names) {
        let mut of_name: Vec<&NamedCandidate> = candidates
            .iter()
            .filter(|c| &c.record.package_record.name == name)
            .collect();
        of_name.sort_by(|a, b| {
            b.record
                .package_record
                .version
                .cmp(&a.record.package_record.version)
        });
        for (rank, candidate) in of_name.into_iter().enumerate() {
            if rank > 0 {
                tier3.push((rank as i64, candidate.lit));
            }
        }
    }
    bestsol = run_tier(clauses, tier3, bestsol);

    // Tier 4 — prefer the latest build number within a (name, version)
    // group: cost is the gap between the group's highest build number and
    // the candidate's own.
    let mut by_name_version: AHashMap<(&PackageName, String), Vec<&NamedCandidate>> =
        AHashMap::new();
    for candidate in candidates {
        by_name_version
            .entry((
                &candidate.record.package_record.name,
                candidate.record.package_record.version.as_str().into_owned(),
            ))
            .or_default()
            .push(candidate);
    }
    let mut tier4 = Vec::new();
    for group in by_name_version.values() {
        let max_build = group
            .iter()
            .map(|c| c.record.package_record.build_number)
            .max()
            .unwrap_or(0);
        for candidate in group {
            let gap = max_build.saturating_sub(candidate.record.package_record.build_number);
            if gap > 0 {
                tier4.push((gap as i64, candidate.lit));
            }
        }
    }
    bestsol = run_tier(clauses, tier4, bestsol);

    // Tier 5 — prefer higher channel priority: cost is the candidate's
    // channel rank (0 is the highest-priority channel).
    let tier5: Vec<ObjectiveTerm> = candidates
        .iter()
        .filter(|c| c.channel_rank > 0)
        .map(|c| (c.channel_rank as i64, c.lit))
        .collect();
    bestsol = run_tier(clauses, tier5, bestsol);

    // Tier 6 — minimise the number of packages not already present in the
    // prior state (penalise gratuitous installs/changes).
    let locked_keys: Vec<(&PackageName, String, &str)> = locked
        .iter()
        .map(|l| {
            (
                &l.package_record.name,
                l.package_record.version.as_str().into_owned(),
                l.package_record.build.as_str(),
            )
        })
        .collect();
    let tier6: Vec<ObjectiveTerm> = candidates
        .iter()
        .filter(|c| {
            let key = (
                &c.record.package_record.name,
                c.record.package_record.version.as_str().into_owned(),
                c.record.package_record.build.as_str(),
            );
            !locked_keys.contains(&key)
        })
        .map(|c| (1i64, c.lit))
        .collect();
    bestsol = run_tier(clauses, tier6, bestsol);

    // Tier 7 — minimise total package count, the final tie-breaker.
    let tier7: Vec<ObjectiveTerm> = candidates.iter().map(|c| (1i64, c.lit)).collect();
    bestsol = run_tier(clauses, tier7, bestsol);

    ObjectiveResult {
        solution: bestsol.unwrap_or_default(),
    }
}

/// Minimises one tier's objective and locks its optimum in as a hard
/// constraint (`Σ cᵢ·xᵢ == value`) before returning the model, so the next
/// tier only explores solutions that are still optimal for this one.
fn run_tier(
    clauses: &mut Clauses,
    objective: Vec<ObjectiveTerm>,
    bestsol: Option<Vec<bool>>,
) -> Option<Vec<bool>> {
    if objective.is_empty() {
        return if bestsol.is_some() {
            bestsol
        } else {
            clauses.sat(&DpllBackend, &[], false, 0)
        };
    }
    let result = clauses.minimize(&DpllBackend, objective.clone(), bestsol);
    let terms: Vec<(i64, Value)> = objective
        .iter()
        .map(|&(c, l)| (c, Value::Lit(l)))
        .collect();
    let gate = clauses.linear_bound_values(terms, result.value, result.value, Polarity::Both);
    clauses.require(gate);
    Some(result.solution)
}

fn exact_name(spec: &MatchSpec) -> Option<&PackageName> {
    matches!(spec.name, rattler_conda_types::PackageNameMatcher::Exact(_))
        .then(|| spec.name.as_exact())
}

fn dedup(mut items: Vec<&str>) -> Vec<&str> {
    items.sort_unstable();
    items.dedup();
    items
}

fn dedup_names<'a>(items: &[&'a PackageName]) -> Vec<&'a PackageName> {
    let mut out: Vec<&PackageName> = Vec::new();
    for &item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
