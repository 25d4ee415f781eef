use super::*;

#[test]
fn test_empty_is_invalid() {
    let bounds = AABB::default();
    assert!(!bounds.is_valid());
    assert!(!bounds.intersects(&AABB::new(Vec3::splat(-1.0), Vec3::splat(1.0))));
}

#[test]
fn test_include_point() {
    let mut bounds = AABB::EMPTY;
    bounds.include_point(Vec3::new(1.0, 2.0, 3.0));
    assert!(bounds.is_valid());
    assert_eq!(bounds.min, Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(bounds.max, Vec3::new(1.0, 2.0, 3.0));

    bounds.include_point(Vec3::new(-1.0, 4.0, 0.0));
    assert_eq!(bounds.min, Vec3::new(-1.0, 2.0, 0.0));
    assert_eq!(bounds.max, Vec3::new(1.0, 4.0, 3.0));
}

#[test]
fn test_from_points_center_extents() {
    let bounds = AABB::from_points([Vec3::ZERO, Vec3::new(2.0, 4.0, 6.0)]);
    assert_eq!(bounds.center(), Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(bounds.extents(), Vec3::new(1.0, 2.0, 3.0));
}

#[test]
fn test_include_aabb_ignores_empty() {
    let mut bounds = AABB::new(Vec3::ZERO, Vec3::ONE);
    bounds.include_aabb(&AABB::EMPTY);
    assert_eq!(bounds, AABB::new(Vec3::ZERO, Vec3::ONE));

    bounds.include_aabb(&AABB::new(Vec3::splat(-1.0), Vec3::splat(0.5)));
    assert_eq!(bounds, AABB::new(Vec3::splat(-1.0), Vec3::ONE));
}

#[test]
fn test_contains_and_intersects() {
    let outer = AABB::new(Vec3::splat(-2.0), Vec3::splat(2.0));
    let inner = AABB::new(Vec3::splat(-1.0), Vec3::splat(1.0));
    let touching = AABB::new(Vec3::splat(2.0), Vec3::splat(3.0));
    let apart = AABB::new(Vec3::splat(5.0), Vec3::splat(6.0));

    assert!(outer.contains(&inner));
    assert!(!inner.contains(&outer));
    assert!(outer.intersects(&touching));
    assert!(!outer.intersects(&apart));
}
