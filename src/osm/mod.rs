// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

mod reader;
mod rules;

pub use reader::{
    add_features_from_buffer, add_features_from_file, add_features_from_files,
    add_features_from_io, features_from_io, BuildStats, Error, Feature, FeatureType, Node, Options,
    PbfError, PruneStats, Relation, RelationMember, RetainedKeys, Tags, Way,
};
pub use rules::{PermissionError, PermissionRules, Rule, RulesError, DEFAULT_SELECTOR};

#[cfg(test)]
mod tests {
    use super::reader::pbf::fixtures::{encode_file, BlockBuilder, Compression};
    use super::*;
    use crate::{Graph, Permission};

    macro_rules! assert_almost_eq {
        ($a:expr, $b:expr) => {
            assert!(
                (($a - $b).abs() < 1e-4),
                "assertion failed: {} ≈ {}",
                $a,
                $b
            )
        };
    }

    const FEATURES: [&str; 2] = ["OsmSchema-V0.6", "DenseNodes"];

    fn build_with(rules: &PermissionRules, data: &[u8]) -> (Graph, BuildStats) {
        let mut g = Graph::new();
        let options = Options { rules };
        let stats = add_features_from_buffer(&mut g, &options, data).unwrap();
        (g, stats)
    }

    fn build(data: &[u8]) -> (Graph, BuildStats) {
        build_with(&PermissionRules::default(), data)
    }

    #[test]
    fn continuous_street() {
        // 1 ── 2 ── 3, both ways named "Elm"
        let data = encode_file(
            &FEATURES,
            vec![BlockBuilder::new()
                .dense_nodes(&[
                    (1, 50.0, 20.0, &[]),
                    (2, 50.0, 20.001, &[]),
                    (3, 50.0, 20.002, &[]),
                ])
                .way(10, &[1, 2], &[("highway", "residential"), ("name", "Elm")])
                .way(11, &[2, 3], &[("highway", "residential"), ("name", "Elm")])
                .build()],
            Compression::Zlib,
        );

        let (g, stats) = build(&data);
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(stats.vertices_created, 4);
        assert_eq!(stats.vertices_merged, 1);
        assert_eq!(g.streets().count(), 4);
        assert_eq!(g.turns().count(), 0);

        let total: f64 = g.streets().map(|(_, s)| s.length).sum();
        assert_almost_eq!(total / 2.0, 2.0 * crate::earth_distance(50.0, 20.0, 50.0, 20.001));
    }

    #[test]
    fn intersection() {
        //      2
        //      │
        // 1 ── 0 ── 3
        let data = encode_file(
            &FEATURES,
            vec![BlockBuilder::new()
                .dense_nodes(&[
                    (100, 50.0, 20.0, &[("highway", "traffic_signals")]),
                    (101, 50.0, 19.999, &[]),
                    (102, 50.001, 20.0, &[]),
                    (103, 50.0, 20.001, &[]),
                ])
                .way(10, &[101, 100], &[("highway", "residential"), ("name", "A")])
                .way(11, &[102, 100], &[("highway", "residential"), ("name", "B")])
                .way(12, &[103, 100], &[("highway", "residential"), ("name", "C")])
                .build()],
            Compression::Raw,
        );

        let (g, stats) = build(&data);
        assert_eq!(g.vertex_count(), 6);
        assert_eq!(stats.vertices_merged, 0);
        assert_eq!(g.streets().count(), 6);
        assert_eq!(g.turns().count(), 6);
    }

    #[test]
    fn islands_are_pruned() {
        let data = encode_file(
            &FEATURES,
            vec![
                BlockBuilder::new()
                    .dense_nodes(&[
                        (1, 50.0, 20.0, &[]),
                        (2, 50.0, 20.001, &[]),
                        (3, 50.0, 20.002, &[]),
                        (4, 50.0, 20.003, &[]), // not used by any way
                        (10, 51.0, 21.0, &[]),
                        (11, 51.0, 21.001, &[]),
                    ])
                    .build(),
                BlockBuilder::new()
                    .way(20, &[1, 2, 3], &[("highway", "footway")])
                    .way(21, &[10, 11], &[("highway", "footway")])
                    .way(22, &[3, 4], &[("building", "yes")])
                    .build(),
            ],
            Compression::Bzip2,
        );

        let (g, stats) = build(&data);
        assert_eq!(stats.pruning.isolated_nodes, 1);
        assert_eq!(stats.pruning.components, 2);
        assert_eq!(stats.pruning.island_nodes, 2);
        assert_eq!(stats.skipped_segments, 1);
        assert_eq!(g.vertex_count(), 3);
        assert!(g
            .streets()
            .all(|(_, s)| s.permission == Permission::PEDESTRIAN && &*s.way == "way 20"));
    }

    #[test]
    fn permissions() {
        let rules = PermissionRules::parse("highway=service BICYCLE\n__default__ ALL\n").unwrap();
        let data = encode_file(
            &FEATURES,
            vec![BlockBuilder::new()
                .dense_nodes(&[
                    (1, 50.0, 20.0, &[]),
                    (2, 50.0, 20.001, &[]),
                    (3, 50.0, 20.002, &[]),
                    (4, 50.0, 20.003, &[]),
                    (5, 50.0, 20.004, &[]),
                ])
                .way(10, &[1, 2], &[("highway", "service")])
                .way(11, &[2, 3], &[("highway", "service"), ("access", "no")])
                .way(12, &[3, 4], &[("highway", "residential")])
                .way(13, &[4, 5], &[("highway", "residential"), ("foot", "no")])
                .build()],
            Compression::Zlib,
        );

        let (g, stats) = build_with(&rules, &data);
        assert_eq!(stats.skipped_ways, 1);

        let permissions: Vec<(&str, Permission)> = g
            .streets()
            .step_by(2)
            .map(|(_, s)| (&*s.way, s.permission))
            .collect();
        assert_eq!(
            permissions,
            vec![
                ("way 10", Permission::BICYCLE),
                ("way 12", Permission::ALL),
                ("way 13", Permission::BICYCLE_AND_CAR),
            ]
        );
    }

    #[test]
    fn rule_keys_survive_decoding() {
        let rules = PermissionRules::parse("bicycle_road=yes BICYCLE\n__default__ NONE\n").unwrap();
        let data = encode_file(
            &FEATURES,
            vec![BlockBuilder::new()
                .dense_nodes(&[(1, 50.0, 20.0, &[]), (2, 50.0, 20.001, &[])])
                .way(10, &[1, 2], &[("highway", "residential"), ("bicycle_road", "yes")])
                .build()],
            Compression::Raw,
        );

        let (g, _) = build_with(&rules, &data);
        assert_eq!(g.streets().count(), 2);
        assert!(g
            .streets()
            .all(|(_, s)| s.permission == Permission::BICYCLE));
    }

    #[test]
    fn names_and_wheelchairs() {
        let data = encode_file(
            &FEATURES,
            vec![BlockBuilder::new()
                .dense_nodes(&[(1, 50.0, 20.0, &[]), (2, 50.0, 20.001, &[])])
                .way(10, &[1, 2], &[("highway", "steps"), ("name", "Castle Stairs")])
                .build()],
            Compression::Raw,
        );

        let (g, _) = build(&data);
        for (_, s) in g.streets() {
            assert_eq!(&*s.name, "Castle Stairs");
            assert_eq!(&*s.way, "way 10");
            assert!(!s.wheelchair_accessible);
        }
    }

    #[test]
    fn unsupported_features() {
        let data = encode_file(
            &["OsmSchema-V0.6", "HistoricalInformation"],
            vec![],
            Compression::Raw,
        );

        let mut g = Graph::new();
        let rules = PermissionRules::default();
        let err = add_features_from_buffer(&mut g, &Options { rules: &rules }, &data).unwrap_err();
        match err {
            Error::Pbf(PbfError::UnsupportedFeatures(f)) => {
                assert_eq!(f, vec!["HistoricalInformation".to_string()])
            }
            e => panic!("unexpected error: {e}"),
        }
        assert_eq!(g.vertex_count(), 0);
    }

    #[test]
    fn multiple_files() {
        let dir = std::env::temp_dir().join(format!("streetgraph-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        // Way in the second file references nodes from the first one
        let nodes = dir.join("nodes.osm.pbf");
        std::fs::write(
            &nodes,
            encode_file(
                &FEATURES,
                vec![BlockBuilder::new()
                    .dense_nodes(&[(1, 50.0, 20.0, &[]), (2, 50.0, 20.001, &[])])
                    .build()],
                Compression::Zlib,
            ),
        )
        .unwrap();

        let ways = dir.join("ways.osm.pbf");
        std::fs::write(
            &ways,
            encode_file(
                &FEATURES,
                vec![BlockBuilder::new()
                    .way(10, &[1, 2], &[("highway", "primary")])
                    .build()],
                Compression::Zlib,
            ),
        )
        .unwrap();

        let mut g = Graph::new();
        let rules = PermissionRules::default();
        let options = Options { rules: &rules };
        let result = add_features_from_files(&mut g, &options, [&nodes, &ways]);
        let missing = add_features_from_file(&mut Graph::new(), &options, dir.join("missing.pbf"));
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(result.unwrap().streets, 2);
        assert_eq!(g.vertex_count(), 2);
        assert!(matches!(missing, Err(Error::Io(_))));
    }
}
