//! Tests for matrix enumeration.

#[cfg(test)]
mod tests {
    use crate::config::{CompilerConfig, Directories, MatrixInputs, MutationRule, SourceEntry};
    use crate::error::Error;
    use crate::matrix::{Blueprint, Matrix};
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};

    fn dirs() -> Directories {
        Directories {
            fuzz: PathBuf::from("/w/fuzz"),
            build: PathBuf::from("/w/build"),
            reports: PathBuf::from("/w/reports"),
        }
    }

    fn inputs(sources: usize, rules: usize, compilers: usize) -> MatrixInputs {
        MatrixInputs {
            sources: (0..sources)
                .map(|i| SourceEntry {
                    source: PathBuf::from(format!("polybench/bench{i}.c")),
                    kernel: format!("kernel_bench{i}"),
                })
                .collect(),
            rules: (0..rules)
                .map(|i| MutationRule {
                    suffix: format!("m{i}"),
                    command: format!("polycc --variant {i}"),
                })
                .collect(),
            compilers: (0..compilers)
                .map(|i| CompilerConfig {
                    suffix: format!("cc{i}"),
                    command: format!("gcc -O{i}"),
                })
                .collect(),
        }
    }

    #[test]
    fn test_matrix_size_and_unique_binaries() {
        for (n, m, k) in [(1, 0, 1), (3, 2, 1), (2, 3, 4), (5, 1, 2)] {
            let matrix = Matrix::enumerate(&inputs(n, m, k), &dirs(), "").unwrap();
            assert_eq!(matrix.len(), k * n * (m + 1), "N={n} M={m} K={k}");

            let binaries: HashSet<&Path> = matrix.iter().map(|b| b.binary.as_path()).collect();
            assert_eq!(binaries.len(), matrix.len(), "binary paths must be unique");
        }
    }

    #[test]
    fn test_mutants_point_at_an_original() {
        let matrix = Matrix::enumerate(&inputs(3, 2, 2), &dirs(), "").unwrap();
        for blueprint in &matrix {
            let original = matrix.original_of(blueprint).unwrap();
            assert!(original.mutation.is_none());
            assert_eq!(original.compiler, blueprint.compiler);
            assert_eq!(original.source_original, blueprint.source_original);
            if blueprint.is_original() {
                assert_eq!(original.binary, blueprint.binary, "an original is its own reference");
            }
        }
    }

    #[test]
    fn test_groups_preserve_order() {
        let matrix = Matrix::enumerate(&inputs(2, 2, 2), &dirs(), "").unwrap();
        assert_eq!(matrix.compilers(), vec!["cc0", "cc1"]);

        let groups = matrix.groups();
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0].original, PathBuf::from("/w/build/bench0.cc0"));
        assert_eq!(groups[1].original, PathBuf::from("/w/build/bench1.cc0"));
        assert_eq!(groups[2].compiler, "cc1");

        let members = matrix.members(&groups[1]);
        let names: Vec<String> = members.iter().map(Blueprint::name).collect();
        assert_eq!(names, vec!["bench1.cc0", "bench1.m0.cc0", "bench1.m1.cc0"]);
    }

    #[test]
    fn test_default_compiler() {
        let mut inputs = inputs(1, 1, 0);
        inputs.compilers.clear();
        let matrix = Matrix::enumerate(&inputs, &dirs(), "").unwrap();
        assert_eq!(matrix.len(), 2);
        assert!(matrix.iter().all(|b| b.compiler == "clang"));
        assert!(matrix.iter().all(|b| b.compile_command.starts_with("clang")));
    }

    #[test]
    fn test_mutant_blueprint_fields() {
        let matrix = Matrix::enumerate(&inputs(1, 1, 1), &dirs(), "").unwrap();
        let mutant = matrix.get(Path::new("/w/build/bench0.m0.cc0")).unwrap();
        assert_eq!(mutant.source, PathBuf::from("/w/fuzz/bench0.m0.c"));
        assert_eq!(mutant.source_original, PathBuf::from("polybench/bench0.c"));
        assert_eq!(mutant.original_binary, PathBuf::from("/w/build/bench0.cc0"));
        assert_eq!(mutant.kernel, "kernel_bench0");
        assert_eq!(
            mutant.mutation.as_deref(),
            Some(&["polycc".to_string(), "--variant".to_string(), "0".to_string()][..])
        );
        assert_eq!(matrix.position(&mutant.binary), Some(1));
    }

    #[test]
    fn test_colliding_binaries_fail_fast() {
        let mut inputs = inputs(1, 0, 1);
        inputs.sources.push(SourceEntry {
            source: PathBuf::from("other/bench0.c"),
            kernel: "kernel_bench0".to_string(),
        });
        match Matrix::enumerate(&inputs, &dirs(), "") {
            Err(Error::DuplicateBinary(path)) => assert_eq!(path, PathBuf::from("/w/build/bench0.cc0")),
            other => panic!("expected a duplicate binary, got {:?}", other.map(|m| m.len())),
        }
    }

    #[test]
    fn test_empty_inputs_are_rejected() {
        assert!(matches!(
            Matrix::enumerate(&inputs(0, 1, 1), &dirs(), ""),
            Err(Error::NoSources)
        ));

        let mut empty_rule = inputs(1, 1, 1);
        empty_rule.rules[0].command = "  ".to_string();
        assert!(matches!(
            Matrix::enumerate(&empty_rule, &dirs(), ""),
            Err(Error::EmptyMutation(_))
        ));
    }

    #[test]
    fn test_missing_original_is_an_invariant_violation() {
        let mut matrix = Matrix::enumerate(&inputs(1, 1, 1), &dirs(), "").unwrap();
        matrix.blueprints[1].original_binary = PathBuf::from("/w/build/ghost.cc0");
        assert!(matches!(
            matrix.check_originals(),
            Err(Error::MissingOriginal { .. })
        ));
    }
}
