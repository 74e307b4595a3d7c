//! Compiles a [`SolverTask`] into clauses and drives [`rattler_sat`] to find
//! the best-scoring satisfying assignment.

use ahash::AHashMap;
use indexmap::IndexMap;
use rattler_conda_types::{MatchSpec, Matches, PackageName, ParseStrictness, RepoDataRecord};
use rattler_sat::{unsat_core, Clauses, DpllBackend, Lit, Polarity, Value};

use crate::objective::{self, NamedCandidate};
use crate::{ChannelPriority, DepsModifier, SolveError, SolverTask, UpdateModifier};

/// A candidate package record together with the SAT literal allocated for
/// "this record is selected" and the priority rank of the channel it came
/// from (`0` is highest priority).
pub(crate) struct Candidate {
    pub(crate) record: RepoDataRecord,
    pub(crate) lit: Lit,
    pub(crate) channel_rank: usize,
}

/// Resolves [`SolverTask`]s against the built-in SAT encoding and
/// [`rattler_sat::DpllBackend`].
#[derive(Debug, Default)]
pub struct Solver;

impl Solver {
    /// Resolves `task`, returning the chosen package set. The result order
    /// is unspecified; callers that need a link order should feed it through
    /// a transaction engine (topological on `depends`).
    pub fn solve<I: IntoIterator<Item = RepoDataRecord>>(
        &self,
        task: SolverTask<I>,
    ) -> Result<Vec<RepoDataRecord>, SolveError> {
        if task.update_modifier == UpdateModifier::SpecsSatisfiedSkipSolve
            && task
                .specs
                .iter()
                .all(|spec| task.locked_packages.iter().any(|p| spec.matches(p)))
        {
            return Ok(task.locked_packages);
        }

        let mut clauses = Clauses::new();
        let mut by_name: IndexMap<PackageName, Vec<Candidate>> = IndexMap::new();
        let mut channel_rank_of: AHashMap<String, usize> = AHashMap::new();

        for record in task.available_packages {
            let name = record.package_record.name.clone();
            let next_rank = channel_rank_of.len();
            let channel_rank = *channel_rank_of
                .entry(record.channel.clone())
                .or_insert(next_rank);
            let lit = clauses.new_var();
            by_name
                .entry(name)
                .or_default()
                .push(Candidate {
                    record,
                    lit,
                    channel_rank,
                });
        }

        // One-variant-per-name: at most one candidate selected per name, and
        // required if some requested or dependency spec demands the name.
        for candidates in by_name.values() {
            let vals: Vec<Value> = candidates.iter().map(|c| Value::Lit(c.lit)).collect();
            let gate = clauses.at_most_one(vals, Polarity::Both);
            clauses.require(gate);
        }

        // Pinned packages must be selected exactly as given, with no
        // substitution: find the candidate matching each pin by identity and
        // require it. A pin naming a record absent from `available_packages`
        // is simply unsatisfiable by the rest of the clause set.
        for pin in &task.pinned_packages {
            if let Some(candidate) = find_exact_candidate(&by_name, pin) {
                clauses.require(Value::Lit(candidate.lit));
            }
        }

        // `FreezeInstalled` pins every already-installed package in place,
        // the same way an explicit pin does, so the only freedom left to the
        // solver is adding packages the new specs require.
        if task.update_modifier == UpdateModifier::FreezeInstalled {
            for locked in &task.locked_packages {
                if let Some(candidate) = find_exact_candidate(&by_name, locked) {
                    clauses.require(Value::Lit(candidate.lit));
                }
            }
        }

        // Dependencies: p -> Any(candidates matching each depends entry).
        // `NoDeps` skips this: the caller asserts dependencies are already
        // satisfied, so only the requested specs themselves are resolved.
        if task.deps_modifier != DepsModifier::NoDeps {
            for candidates in by_name.values() {
                for candidate in candidates {
                    for dep in &candidate.record.package_record.depends {
                        let spec = parse_spec(dep)?;
                        let satisfied =
                            any_matching(&mut clauses, &by_name, &task.virtual_packages, &spec);
                        let not_p = clauses.not(Value::Lit(candidate.lit));
                        let implication = clauses.or(not_p, satisfied, Polarity::Both);
                        clauses.require(implication);
                    }
                }
            }
        }

        // Constrains: (p AND any q selected) -> Any(qi matching the constrain).
        for candidates in by_name.values() {
            for candidate in candidates {
                for constrain in &candidate.record.package_record.constrains {
                    let spec = parse_spec(constrain)?;
                    let Some(target_name) = exact_name(&spec) else {
                        continue;
                    };
                    let Some(target_candidates) = by_name.get(target_name) else {
                        continue;
                    };
                    let any_target_selected = clauses.any(
                        target_candidates.iter().map(|c| Value::Lit(c.lit)),
                        Polarity::Both,
                    );
                    let antecedent =
                        clauses.and(Value::Lit(candidate.lit), any_target_selected, Polarity::Both);
                    let satisfied =
                        any_matching(&mut clauses, &by_name, &task.virtual_packages, &spec);
                    let not_antecedent = clauses.not(antecedent);
                    let implication = clauses.or(not_antecedent, satisfied, Polarity::Both);
                    clauses.require(implication);
                }
            }
        }

        // Channel priority (strict): a candidate from a lower-priority
        // channel may only be selected if nothing from a higher-priority
        // channel (for the same name) is selectable.
        if task.channel_priority == ChannelPriority::Strict {
            for candidates in by_name.values() {
                for candidate in candidates {
                    let higher: Vec<Value> = candidates
                        .iter()
                        .filter(|other| other.channel_rank < candidate.channel_rank)
                        .map(|other| Value::Lit(other.lit))
                        .collect();
                    if higher.is_empty() {
                        continue;
                    }
                    let any_higher = clauses.any(higher, Polarity::Both);
                    let antecedent =
                        clauses.and(Value::Lit(candidate.lit), any_higher, Polarity::Both);
                    clauses.prevent(antecedent);
                }
            }
        }

        // Features: any p advertising feature f -> any q that tracks f.
        let mut track_feature_holders: AHashMap<&str, Vec<Lit>> = AHashMap::new();
        for candidates in by_name.values() {
            for candidate in candidates {
                for feature in &candidate.record.package_record.track_features {
                    track_feature_holders
                        .entry(feature.as_str())
                        .or_default()
                        .push(candidate.lit);
                }
            }
        }
        for candidates in by_name.values() {
            for candidate in candidates {
                let Some(feature) = &candidate.record.package_record.features else {
                    continue;
                };
                let Some(holders) = track_feature_holders.get(feature.as_str()) else {
                    // No other selected record could ever satisfy this
                    // feature requirement: forbid selecting this candidate.
                    clauses.prevent(Value::Lit(candidate.lit));
                    continue;
                };
                let any_holder = clauses.any(holders.iter().map(|&l| Value::Lit(l)), Polarity::Both);
                let not_p = clauses.not(Value::Lit(candidate.lit));
                let implication = clauses.or(not_p, any_holder, Polarity::Both);
                clauses.require(implication);
            }
        }

        // Requested specs become unit clauses tested together; each is kept
        // reversible (as a `Vec<Lit>` clause, not a permanent `require`) so a
        // failed attempt can fall back to extracting a minimal unsat core
        // without having baked the contradiction into the store.
        let requirements: Vec<(MatchSpec, Option<Vec<Lit>>)> = task
            .specs
            .iter()
            .map(|spec| {
                let satisfied = any_matching(&mut clauses, &by_name, &task.virtual_packages, spec);
                let clause = match satisfied {
                    Value::True => None,
                    Value::False => Some(Vec::new()),
                    Value::Lit(lit) => Some(vec![lit]),
                };
                (spec.clone(), clause)
            })
            .collect();

        let all_clauses: Vec<Vec<Lit>> = requirements
            .iter()
            .filter_map(|(_, clause)| clause.clone())
            .collect();

        if clauses.is_unsat()
            || clauses
                .sat(&DpllBackend, &all_clauses, true, 0)
                .is_none()
        {
            let conflicts = unsat_core::minimal_unsatisfiable_subset(
                requirements,
                std::iter::empty(),
                |subset| {
                    let trial: Vec<Vec<Lit>> = subset
                        .iter()
                        .filter_map(|(_, clause)| clause.clone())
                        .collect();
                    clauses.sat(&DpllBackend, &trial, false, 0).is_some()
                },
            );
            return Err(SolveError::Unsolvable(
                conflicts.into_iter().map(|(spec, _)| spec).collect(),
            ));
        }

        let named_candidates: Vec<NamedCandidate> = by_name
            .values()
            .flatten()
            .map(|c| NamedCandidate {
                lit: c.lit,
                record: &c.record,
                channel_rank: c.channel_rank,
            })
            .collect();

        // `UpdateAll` extends "prefer the latest version" to every package
        // already in the prefix, not just the ones a spec names, by feeding
        // the objective the union of explicit spec names and locked names.
        let update_all_names: Vec<PackageName> = if task.update_modifier == UpdateModifier::UpdateAll {
            task.locked_packages
                .iter()
                .map(|l| l.package_record.name.clone())
                .collect()
        } else {
            Vec::new()
        };

        let result = objective::minimize(
            &mut clauses,
            &named_candidates,
            &task.locked_packages,
            &task.pinned_packages,
            &task.specs,
            &update_all_names,
        );

        let solution = named_candidates
            .iter()
            .filter(|c| result.solution.get(c.lit as usize - 1).copied().unwrap_or(false))
            .map(|c| c.record.clone());

        // `OnlyDeps` resolves a spec's dependencies but never installs the
        // spec's own package, so the named package itself is dropped from
        // the final set even though it stayed selected throughout solving.
        if task.deps_modifier == DepsModifier::OnlyDeps {
            let excluded: Vec<&PackageName> = task.specs.iter().filter_map(exact_name).collect();
            Ok(solution
                .filter(|r| !excluded.contains(&&r.package_record.name))
                .collect())
        } else {
            Ok(solution.collect())
        }
    }
}

/// Finds the candidate whose record has the same name, version and build
/// string as `target`, i.e. the same package identity.
fn find_exact_candidate<'a>(
    by_name: &'a IndexMap<PackageName, Vec<Candidate>>,
    target: &RepoDataRecord,
) -> Option<&'a Candidate> {
    by_name
        .get(&target.package_record.name)?
        .iter()
        .find(|c| {
            c.record.package_record.version == target.package_record.version
                && c.record.package_record.build == target.package_record.build
        })
}

fn parse_spec(raw: &str) -> Result<MatchSpec, SolveError> {
    MatchSpec::from_str(raw, ParseStrictness::Lenient)
        .map_err(|e| SolveError::InvalidMatchSpec(format!("{raw}: {e}")))
}

fn exact_name(spec: &MatchSpec) -> Option<&PackageName> {
    matches!(spec.name, rattler_conda_types::PackageNameMatcher::Exact(_))
        .then(|| spec.name.as_exact())
}

/// Builds `Any(candidates matching spec)`, short-circuiting to `Value::True`
/// if a virtual package already satisfies it.
fn any_matching(
    clauses: &mut Clauses,
    by_name: &IndexMap<PackageName, Vec<Candidate>>,
    virtual_packages: &[rattler_conda_types::GenericVirtualPackage],
    spec: &MatchSpec,
) -> Value {
    if virtual_packages.iter().any(|vp| spec.matches(vp)) {
        return Value::True;
    }
    let matches: Vec<Value> = match exact_name(spec) {
        Some(name) => by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter(|c| spec.matches(&c.record))
            .map(|c| Value::Lit(c.lit))
            .collect(),
        None => by_name
            .values()
            .flatten()
            .filter(|c| spec.matches(&c.record))
            .map(|c| Value::Lit(c.lit))
            .collect(),
    };
    clauses.any(matches, Polarity::Both)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rattler_conda_types::{PackageRecord, Version};
    use std::str::FromStr;

    fn record(name: &str, version: &str, depends: Vec<&str>) -> RepoDataRecord {
        RepoDataRecord {
            package_record: PackageRecord {
                depends: depends.into_iter().map(String::from).collect(),
                ..PackageRecord::new(
                    name.parse().unwrap(),
                    Version::from_str(version).unwrap(),
                    "0".to_string(),
                )
            },
            file_name: format!("{name}-{version}-0.tar.bz2"),
            url: format!("https://example.com/{name}-{version}-0.tar.bz2")
                .parse()
                .unwrap(),
            channel: "conda-forge".to_string(),
        }
    }

    #[test]
    fn resolves_a_simple_dependency_chain() {
        let available = vec![
            record("a", "1.0", vec!["b"]),
            record("b", "2.0", vec![]),
        ];
        let task = SolverTask {
            available_packages: available,
            locked_packages: vec![],
            pinned_packages: vec![],
            virtual_packages: vec![],
            specs: vec![MatchSpec::from_str("a", ParseStrictness::Lenient).unwrap()],
            channel_priority: ChannelPriority::Strict,
            update_modifier: crate::UpdateModifier::UpdateSpecs,
            deps_modifier: crate::DepsModifier::NotSet,
        };
        let solution = Solver.solve(task).expect("solvable");
        let names: Vec<&str> = solution
            .iter()
            .map(|r| r.package_record.name.as_normalized())
            .collect();
        assert!(names.contains(&"a"));
        assert!(names.contains(&"b"));
    }

    #[test]
    fn unsatisfiable_dependency_is_reported() {
        let available = vec![record("a", "1.0", vec!["missing"])];
        let task = SolverTask {
            available_packages: available,
            locked_packages: vec![],
            pinned_packages: vec![],
            virtual_packages: vec![],
            specs: vec![MatchSpec::from_str("a", ParseStrictness::Lenient).unwrap()],
            channel_priority: ChannelPriority::Strict,
            update_modifier: crate::UpdateModifier::UpdateSpecs,
            deps_modifier: crate::DepsModifier::NotSet,
        };
        assert!(matches!(
            Solver.solve(task),
            Err(SolveError::Unsolvable(_))
        ));
    }
}
