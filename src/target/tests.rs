use super::*;

#[test]
fn test_levels_are_ordered() {
    let mut sorted = FeatureLevel::ALL;
    sorted.sort();
    assert_eq!(sorted, FeatureLevel::ALL);
    assert!(FeatureLevel::Avx2 > FeatureLevel::AvxFma);
    assert!(FeatureLevel::Avx512f > FeatureLevel::Avx2Fma);
}

#[test]
fn test_parse_names() {
    for level in FeatureLevel::ALL {
        assert_eq!(FeatureLevel::parse(level.name()), Some(level));
    }
    assert_eq!(FeatureLevel::parse("AVX2-FMA"), Some(FeatureLevel::Avx2Fma));
    assert_eq!(FeatureLevel::parse(" sse2 "), Some(FeatureLevel::Sse2));
    assert_eq!(FeatureLevel::parse("neon"), None);
}

#[test]
fn test_level_of_feature_set() {
    assert_eq!(FeatureSet::baseline().level(), FeatureLevel::Sse2);
    assert_eq!(FeatureSet::all().level(), FeatureLevel::Avx512fFma);
    let avx2_only = FeatureSet {
        avx: true,
        avx2: true,
        ..FeatureSet::baseline()
    };
    assert_eq!(avx2_only.level(), FeatureLevel::Avx2);
    let avx_fma = FeatureSet {
        avx: true,
        fma: true,
        ..FeatureSet::baseline()
    };
    assert_eq!(avx_fma.level(), FeatureLevel::AvxFma);
}

#[test]
fn test_level_features_round_trip() {
    for level in FeatureLevel::ALL {
        assert_eq!(level.features().level(), level);
        assert_eq!(level.features().fma, level.has_fma());
    }
}

#[test]
fn test_normalized_drops_orphans() {
    let odd = FeatureSet {
        sse2: true,
        avx: false,
        avx2: true,
        avx512f: true,
        fma: true,
    };
    assert_eq!(odd.normalized(), FeatureSet::baseline());
}

#[test]
fn test_up_to() {
    let levels: Vec<_> = FeatureLevel::AvxFma.up_to().collect();
    assert_eq!(
        levels,
        vec![FeatureLevel::Sse2, FeatureLevel::Avx, FeatureLevel::AvxFma]
    );
}

#[test]
fn test_host_level_within_detected() {
    if !host_supported() {
        return;
    }
    assert!(host_level() <= detect().level());
    assert!(detect().sse2);
}

#[test]
fn test_describe() {
    assert_eq!(FeatureSet::baseline().describe(), "sse2");
    assert_eq!(FeatureSet::all().describe(), "sse2 avx avx2 avx512f fma");
}
