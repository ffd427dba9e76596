//! Dockerfile emission for the `/{build_id}/dockerfile` endpoint.
//!
//! Produces a `repo2docker`-compatible build context description: an
//! `apt.txt` package list and a conda `environment.yml`, folded into one
//! Dockerfile-shaped document rather than repo2docker's own multi-file
//! layout, since the endpoint serves a single `text/plain` body.

use crate::spec::ContainerSpec;

/// Render `spec` as a single Dockerfile-like document a caller can read or
/// paste into their own repo2docker-based build. Does not support tarball
/// ("advanced build") containers, matching the original's restriction.
pub fn emit(spec: &ContainerSpec) -> String {
    let mut out = String::new();

    out.push_str("# Generated by catalogd. Roughly compatible with repo2docker.\n");

    if !spec.apt.is_empty() {
        out.push_str("\n# apt.txt\n");
        for pkg in &spec.apt {
            out.push_str(pkg);
            out.push('\n');
        }
    }

    out.push_str("\n# environment.yml\n");
    out.push_str(&render_environment_yml(spec));

    out
}

fn render_environment_yml(spec: &ContainerSpec) -> String {
    let mut deps = vec!["pip".to_string()];
    deps.extend(spec.conda.iter().cloned());

    let mut out = String::new();
    out.push_str("name: catalogd-container\n");
    out.push_str("channels:\n  - conda-forge\n");
    out.push_str("dependencies:\n");
    for dep in &deps {
        out.push_str("  - ");
        out.push_str(dep);
        out.push('\n');
    }
    if !spec.pip.is_empty() {
        out.push_str("  - pip:\n");
        for pkg in &spec.pip {
            out.push_str("      - ");
            out.push_str(pkg);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_apt_and_pip() {
        let spec = ContainerSpec {
            apt: vec!["curl".into()],
            conda: vec![],
            pip: vec!["numpy".into()],
        };
        let rendered = emit(&spec);
        assert!(rendered.contains("curl"));
        assert!(rendered.contains("numpy"));
        assert!(rendered.contains("dependencies:"));
    }

    #[test]
    fn omits_apt_section_when_empty() {
        let spec = ContainerSpec::default();
        let rendered = emit(&spec);
        assert!(!rendered.contains("apt.txt"));
    }
}
