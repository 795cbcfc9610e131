//! # Benchmark Matrix
//!
//! The matrix is the cartesian product `compiler × source × (original + mutations)`.
//! Each cell is a [`Blueprint`]: everything needed to mutate, build and
//! measure one binary, and to find the original it is compared against.
//!
//! Blueprints are grouped by compiler, then by original binary, in the order
//! they were enumerated. Output tables keep that order so every mutant stays
//! next to its original.

pub mod paths;
pub mod test;

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

pub use paths::{resolve, ArtifactPaths, ReportKind};

use crate::config::{CompilerConfig, Directories, MatrixInputs};
use crate::error::{Error, Result};

/// One buildable and measurable unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blueprint {
    pub source_original: PathBuf,
    /// Binary of the un-mutated source built with the same compiler.
    pub original_binary: PathBuf,
    pub kernel: String,
    /// Mutation command tokens, `None` for an original.
    pub mutation: Option<Vec<String>>,
    /// Source this binary is built from (the original source for an original).
    pub source: PathBuf,
    pub compiler: String,
    pub compile_command: String,
    pub binary: PathBuf,
    pub profile_report: PathBuf,
    pub sim_report: PathBuf,
    pub sensitivity_report: PathBuf,
}

impl Blueprint {
    pub fn is_original(&self) -> bool {
        self.mutation.is_none()
    }

    pub fn report_path(&self, kind: ReportKind) -> &Path {
        match kind {
            ReportKind::Profile => &self.profile_report,
            ReportKind::Simulation => &self.sim_report,
            ReportKind::Sensitivity => &self.sensitivity_report,
        }
    }

    /// Display name: the binary file name.
    pub fn name(&self) -> String {
        self.binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// An original and its mutants under one compiler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub compiler: String,
    pub original: PathBuf,
    members: Range<usize>,
}

#[derive(Debug, Default)]
pub struct Matrix {
    blueprints: Vec<Blueprint>,
    groups: Vec<Group>,
    index: HashMap<PathBuf, usize>,
}

impl Matrix {
    /// Enumerate every blueprint.
    ///
    /// Without compiler configurations a single default one is used.
    /// Fails if two blueprints would produce the same binary.
    pub fn enumerate(inputs: &MatrixInputs, dirs: &Directories, binary_extension: &str) -> Result<Self> {
        if inputs.sources.is_empty() {
            return Err(Error::NoSources);
        }
        let default_compilers = [CompilerConfig::default()];
        let compilers = if inputs.compilers.is_empty() {
            &default_compilers[..]
        } else {
            &inputs.compilers[..]
        };

        let mut rules = Vec::with_capacity(inputs.rules.len());
        for rule in &inputs.rules {
            let tokens: Vec<String> = rule.command.split_whitespace().map(String::from).collect();
            if tokens.is_empty() {
                return Err(Error::EmptyMutation(rule.suffix.clone()));
            }
            rules.push((rule.suffix.as_str(), tokens));
        }

        let mut matrix = Matrix::default();
        for compiler in compilers {
            if compiler.command.split_whitespace().next().is_none() {
                return Err(Error::EmptyCompiler(compiler.suffix.clone()));
            }
            for entry in &inputs.sources {
                let start = matrix.blueprints.len();
                let original = resolve(dirs, binary_extension, &entry.source, None, &compiler.suffix);
                let original_binary = original.binary.clone();
                matrix.push(Blueprint {
                    source_original: entry.source.clone(),
                    original_binary: original_binary.clone(),
                    kernel: entry.kernel.clone(),
                    mutation: None,
                    source: original.source,
                    compiler: compiler.suffix.clone(),
                    compile_command: compiler.command.clone(),
                    binary: original.binary,
                    profile_report: original.profile_report,
                    sim_report: original.sim_report,
                    sensitivity_report: original.sensitivity_report,
                })?;

                for (suffix, tokens) in &rules {
                    let mutant = resolve(dirs, binary_extension, &entry.source, Some(*suffix), &compiler.suffix);
                    matrix.push(Blueprint {
                        source_original: entry.source.clone(),
                        original_binary: original_binary.clone(),
                        kernel: entry.kernel.clone(),
                        mutation: Some(tokens.clone()),
                        source: mutant.source,
                        compiler: compiler.suffix.clone(),
                        compile_command: compiler.command.clone(),
                        binary: mutant.binary,
                        profile_report: mutant.profile_report,
                        sim_report: mutant.sim_report,
                        sensitivity_report: mutant.sensitivity_report,
                    })?;
                }

                matrix.groups.push(Group {
                    compiler: compiler.suffix.clone(),
                    original: original_binary,
                    members: start..matrix.blueprints.len(),
                });
            }
        }
        matrix.check_originals()?;
        Ok(matrix)
    }

    fn push(&mut self, blueprint: Blueprint) -> Result<()> {
        if self.index.contains_key(&blueprint.binary) {
            return Err(Error::DuplicateBinary(blueprint.binary));
        }
        self.index.insert(blueprint.binary.clone(), self.blueprints.len());
        self.blueprints.push(blueprint);
        Ok(())
    }

    /// Every blueprint must point at an original present in the matrix.
    fn check_originals(&self) -> Result<()> {
        for blueprint in &self.blueprints {
            self.original_of(blueprint)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }

    /// All blueprints in matrix order.
    pub fn iter(&self) -> std::slice::Iter<'_, Blueprint> {
        self.blueprints.iter()
    }

    pub fn as_slice(&self) -> &[Blueprint] {
        &self.blueprints
    }

    pub fn get(&self, binary: &Path) -> Option<&Blueprint> {
        self.index.get(binary).map(|&i| &self.blueprints[i])
    }

    /// Position of a binary in matrix order.
    pub fn position(&self, binary: &Path) -> Option<usize> {
        self.index.get(binary).copied()
    }

    pub fn original_of(&self, blueprint: &Blueprint) -> Result<&Blueprint> {
        match self.get(&blueprint.original_binary) {
            Some(original) if original.is_original() => Ok(original),
            _ => Err(Error::MissingOriginal {
                binary: blueprint.binary.clone(),
                original: blueprint.original_binary.clone(),
            }),
        }
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Original first, then its mutants.
    pub fn members(&self, group: &Group) -> &[Blueprint] {
        &self.blueprints[group.members.clone()]
    }

    /// Compiler suffixes in enumeration order.
    pub fn compilers(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for group in &self.groups {
            if !seen.contains(&group.compiler.as_str()) {
                seen.push(&group.compiler);
            }
        }
        seen
    }
}

impl<'a> IntoIterator for &'a Matrix {
    type Item = &'a Blueprint;
    type IntoIter = std::slice::Iter<'a, Blueprint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
