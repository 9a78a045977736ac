// SPDX-License-Identifier: MPL-2.0

use mobros::config::ResolverConfig;
use mobros::conflict::ConflictKind;
use mobros::error::ResolveError;
use mobros::oracle::{OfflineOracle, Provider};
use mobros::planner::InstallPlan;
use mobros::resolver::Resolver;
use mobros::rule::{Author, Dependency, Operator};

const VERSIONS: [&str; 5] = ["2.0.0-8", "2.0.0-3", "1.2.0-3", "1.0.2-1", "1.0.0-55"];

fn with_p() -> OfflineOracle {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut oracle = OfflineOracle::new();
    for v in VERSIONS {
        oracle.add_dependencies("p", v, []);
    }
    oracle
}

fn resolver(oracle: &OfflineOracle) -> Resolver<&OfflineOracle> {
    Resolver::new(oracle, ResolverConfig::default()).unwrap()
}

#[test]
fn edges_combine() {
    let mut oracle = with_p();
    oracle.add_dependencies("x", "1", [vec![Dependency::new("p", Operator::Gt, "1.0.0-0")]]);
    oracle.add_dependencies("y", "1", [vec![Dependency::new("p", Operator::Lte, "2.0.0-0")]]);
    let mut resolver = resolver(&oracle);
    resolver.register_root("x", None).unwrap();
    resolver.register_root("y", None).unwrap();
    let resolution = resolver.resolve().unwrap();
    let p = &resolution.candidates["p"];
    assert_eq!(p.version, "1.2.0-3");
    assert_eq!(
        p.rationales,
        vec!["x=1 requires > 1.0.0-0", "y=1 requires <= 2.0.0-0"]
    );
}

#[test]
fn equals_wins() {
    let mut oracle = with_p();
    oracle.add_dependencies("x", "1", [vec![Dependency::new("p", Operator::Eq, "1.0.0-55")]]);
    oracle.add_dependencies("y", "1", [vec![Dependency::new("p", Operator::Gte, "1.0.0-0")]]);
    oracle.add_dependencies("z", "1", [vec![Dependency::any("p")]]);
    let mut resolver = resolver(&oracle);
    for root in ["x", "y", "z"] {
        resolver.register_root(root, None).unwrap();
    }
    assert_eq!(resolver.resolve().unwrap().candidates["p"].version, "1.0.0-55");
}

#[test]
fn equals_above_an_upper_bound() {
    let mut oracle = with_p();
    oracle.add_dependencies(
        "x",
        "1",
        [
            vec![Dependency::new("p", Operator::Eq, "1.0.0-55")],
            vec![Dependency::new("p", Operator::Lte, "1.0.0-10")],
        ],
    );
    let mut resolver = resolver(&oracle);
    resolver.register_root("x", None).unwrap();
    match resolver.resolve() {
        Err(ResolveError::Conflict(conflicts)) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].package, "p");
            assert_eq!(conflicts[0].kind, ConflictKind::EqualsAboveUpper);
            assert_eq!(conflicts[0].authors(), vec![&Author::package("x", "1")]);
        }
        other => panic!("expected a conflict, got {:?}", other.map(|r| r.candidates)),
    }
}

#[test]
fn subtree_recomputation() {
    let mut oracle = OfflineOracle::new();
    oracle.add_dependencies("a", "0.0.1-4", [vec![Dependency::new("b", Operator::Lt, "1.0.0-0")]]);
    oracle.add_dependencies("b", "0.0.1-11", [vec![Dependency::new("c", Operator::Lte, "1.0.0-2")]]);
    oracle.add_dependencies("b", "0.0.1-3", []);
    oracle.add_dependencies("c", "1.0.0-5", []);
    oracle.add_dependencies("c", "1.0.0-2", []);
    oracle.add_dependencies("c", "0.9", []);
    oracle.add_dependencies("d", "1.0", [vec![Dependency::new("b", Operator::Lt, "0.0.1-5")]]);

    let mut resolver = resolver(&oracle);
    resolver.register_root("a", Some("0.0.1-4")).unwrap();
    let first = resolver.resolve().unwrap();
    assert_eq!(first.candidates["b"].version, "0.0.1-11");
    assert_eq!(first.candidates["c"].version, "1.0.0-2");

    // A later root invalidates b=0.0.1-11.
    resolver.register_root("d", None).unwrap();
    let second = resolver.resolve().unwrap();
    assert_eq!(second.candidates["b"].version, "0.0.1-3");
    assert!(!second.candidates.contains_key("c"));
    assert!(!second.bank.contains("c"));
    assert!(!second.tree.contains("c"));

    let b = second.tree.nodes("b");
    assert_eq!(b.len(), 1);
    assert_eq!(second.tree.node(b[0]).epoch, 1);
    let mut parents = second.tree.parents("b");
    parents.sort();
    assert_eq!(parents, vec!["a", "d"]);
}

#[test]
fn independent_roots_are_installed_last() {
    let mut oracle = OfflineOracle::new();
    oracle.add_dependencies("p1", "1", [vec![Dependency::any("p2")]]);
    oracle.add_dependencies("p2", "1", [vec![Dependency::any("leaf")]]);
    oracle.add_dependencies("p3", "1", []);
    oracle.add_dependencies("leaf", "1", []);
    let mut resolver = resolver(&oracle);
    for root in ["p1", "p2", "p3"] {
        resolver.register_root(root, None).unwrap();
    }
    let resolution = resolver.resolve().unwrap();
    let plan = InstallPlan::new(&resolution, &oracle).unwrap();
    assert_eq!(plan.install, vec!["leaf=1", "p2=1", "p1=1", "p3=1"]);
    assert_eq!(plan.auto, vec!["leaf"]);
}

#[test]
fn virtual_input_is_skipped() {
    let mut oracle = OfflineOracle::new();
    oracle.add_dependencies("real", "1", []);
    oracle.add_virtual("virt", [Provider::new("real", 0)]);
    let mut resolver = resolver(&oracle);
    resolver.register_root("virt", None).unwrap();
    assert_eq!(resolver.skipped(), ["virt"]);
    let resolution = resolver.resolve().unwrap();
    assert!(resolution.candidates.is_empty());
    assert!(InstallPlan::new(&resolution, &oracle).unwrap().is_empty());
}

#[test]
fn installed_version_is_relaxed() {
    let mut oracle = OfflineOracle::new();
    oracle.add_dependencies("q", "1.0", []);
    oracle.add_dependencies("q", "1.1", []);
    oracle.add_dependencies("w", "1", [vec![Dependency::new("q", Operator::Eq, "1.1")]]);
    oracle.set_installed("q", "1.0");

    let mut resolver = resolver(&oracle);
    resolver.register_root("w", None).unwrap();
    let resolution = resolver.resolve().unwrap();
    assert_eq!(resolution.candidates["q"].version, "1.1");
    assert!(resolution
        .bank
        .rules_for("q")
        .iter()
        .all(|r| r.from != Author::Installed));
    let plan = InstallPlan::new(&resolution, &oracle).unwrap();
    assert_eq!(plan.install, vec!["q=1.1", "w=1"]);
    assert_eq!(plan.auto, vec!["q"]);

    // Requested directly, q is held instead.
    let mut resolver = self::resolver(&oracle);
    resolver.register_root("q", Some("1.1")).unwrap();
    let plan = InstallPlan::new(&resolver.resolve().unwrap(), &oracle).unwrap();
    assert_eq!(plan.install, vec!["q=1.1"]);
    assert_eq!(plan.hold, vec!["q"]);
    assert!(plan.auto.is_empty());
}

#[test]
fn relaxation_can_be_disabled() {
    let mut oracle = OfflineOracle::new();
    oracle.add_dependencies("q", "1.0", []);
    oracle.add_dependencies("q", "1.1", []);
    oracle.set_installed("q", "1.0");
    let config = ResolverConfig {
        relax_installed: false,
        ..ResolverConfig::default()
    };
    let mut resolver = Resolver::new(&oracle, config).unwrap();
    resolver.register_root("q", Some("1.1")).unwrap();
    assert!(matches!(resolver.resolve(), Err(ResolveError::Conflict(_))));
}
