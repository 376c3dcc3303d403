use crate::population::CellType;
use crate::vecmath::Vec3;
use log::debug;
use rayon::prelude::*;

/// Reference population used to size the central subvolume. The subvolume is
/// chosen so that a roughly uniform distribution would place about this many
/// cells inside it. Fixed policy, not configuration.
pub const TARGET_CELL_COUNT: usize = 10_000;

/// Cap on a single pair's contribution to the energy sums; also the weight of
/// a close pair in the energy denominator.
const PAIR_ENERGY_CAP: f32 = 100.0;

/// Subvolume occupancy bounds relative to the reference population.
const MIN_OCCUPANCY_RATIO: f32 = 0.25;
const MAX_OCCUPANCY_RATIO: f32 = 4.0;

/// Maximum tolerated share of different-type pairs among close pairs.
const MAX_MIXED_PAIR_RATIO: f32 = 0.1;

/// Minimum average count of close same-type pairs per subvolume cell.
const MIN_AVG_SAME_TYPE_NEIGHBORS: f32 = 100.0;

/// Selects the cells inside the central subvolume: a cube around
/// (0.5, 0.5, 0.5) with half-extent `(target / n)^(1/3) / 2` per axis.
fn central_subvolume(
    positions: &[Vec3],
    types: &[CellType],
    target: usize,
) -> (Vec<Vec3>, Vec<CellType>) {
    let n = positions.len().max(1);
    let half_extent = (target as f32 / n as f32).powf(1.0 / 3.0) / 2.0;

    let mut sub_positions = Vec::new();
    let mut sub_types = Vec::new();
    for (position, cell_type) in positions.iter().zip(types) {
        if (position.x - 0.5).abs() < half_extent
            && (position.y - 0.5).abs() < half_extent
            && (position.z - 0.5).abs() < half_extent
        {
            sub_positions.push(*position);
            sub_types.push(*cell_type);
        }
    }
    (sub_positions, sub_types)
}

/// Energy measure of clusteredness within the central subvolume. Every pair
/// closer than `spatial_range` contributes `min(100, spatial_range / d)` to
/// the intra-cluster sum (same type) or the extra-cluster sum (different
/// types). Lower is better clustering.
pub fn energy(positions: &[Vec3], types: &[CellType], spatial_range: f32, target: usize) -> f32 {
    let (sub_positions, sub_types) = central_subvolume(positions, types, target);
    let m = sub_positions.len();
    debug!("energy: {} cells in subvolume", m);

    let (intra, extra, close_pairs) = (0..m)
        .into_par_iter()
        .map(|i| {
            let mut intra = 0.0f32;
            let mut extra = 0.0f32;
            let mut close = 0.0f32;
            for j in (i + 1)..m {
                let distance = sub_positions[i].distance(sub_positions[j]);
                if distance < spatial_range {
                    close += 1.0;
                    // A coincident pair yields +inf here; the cap absorbs it.
                    let pair_energy = PAIR_ENERGY_CAP.min(spatial_range / distance);
                    if sub_types[i] == sub_types[j] {
                        intra += pair_energy;
                    } else {
                        extra += pair_energy;
                    }
                }
            }
            (intra, extra, close)
        })
        .reduce(
            || (0.0, 0.0, 0.0),
            |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2),
        );

    (extra - intra) / (1.0 + PAIR_ENERGY_CAP * close_pairs)
}

/// Pass/fail clustering criterion over the central subvolume. Fails when the
/// subvolume is too sparse or too dense relative to the reference population,
/// when too many close pairs mix both types, or when cells average too few
/// close same-type neighbors.
pub fn criterion(positions: &[Vec3], types: &[CellType], spatial_range: f32, target: usize) -> bool {
    let (sub_positions, sub_types) = central_subvolume(positions, types, target);
    let m = sub_positions.len();

    let occupancy = m as f32 / target as f32;
    if occupancy < MIN_OCCUPANCY_RATIO {
        debug!("criterion: not enough cells in subvolume ({})", m);
        return false;
    }
    if occupancy > MAX_OCCUPANCY_RATIO {
        debug!("criterion: too many cells in subvolume ({})", m);
        return false;
    }

    let (close, same_type, diff_type) = (0..m)
        .into_par_iter()
        .map(|i| {
            let mut close = 0u64;
            let mut same_type = 0u64;
            let mut diff_type = 0u64;
            for j in (i + 1)..m {
                if sub_positions[i].distance(sub_positions[j]) < spatial_range {
                    close += 1;
                    if sub_types[i] == sub_types[j] {
                        same_type += 1;
                    } else {
                        diff_type += 1;
                    }
                }
            }
            (close, same_type, diff_type)
        })
        .reduce(|| (0, 0, 0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

    // The +1 keeps the ratio defined when no pair is close at all.
    let mixed_ratio = diff_type as f32 / (close as f32 + 1.0);
    if mixed_ratio > MAX_MIXED_PAIR_RATIO {
        debug!("criterion: cells are not well separated (mixed ratio {:.3})", mixed_ratio);
        return false;
    }

    let avg_same_type_neighbors = same_type as f32 / m as f32;
    if avg_same_type_neighbors < MIN_AVG_SAME_TYPE_NEIGHBORS {
        debug!(
            "criterion: clusters too small (avg same-type neighbors {:.2})",
            avg_same_type_neighbors
        );
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn uniform_positions(rng: &mut StdRng, count: usize) -> Vec<Vec3> {
        (0..count)
            .map(|_| {
                Vec3::new(
                    rng.random_range(0.0..1.0),
                    rng.random_range(0.0..1.0),
                    rng.random_range(0.0..1.0),
                )
            })
            .collect()
    }

    /// A tight blob of cells of one type around a center.
    fn blob(rng: &mut StdRng, center: Vec3, radius: f32, count: usize) -> Vec<Vec3> {
        (0..count)
            .map(|_| {
                center.add(Vec3::new(
                    rng.random_range(-radius..radius),
                    rng.random_range(-radius..radius),
                    rng.random_range(-radius..radius),
                ))
            })
            .collect()
    }

    #[test]
    fn test_criterion_rejects_sparse_subvolume() {
        // 1000 cells against a reference of 10000: occupancy 0.1, below 0.25.
        let mut rng = StdRng::seed_from_u64(1);
        let positions = uniform_positions(&mut rng, 1000);
        let types: Vec<CellType> = (0..1000)
            .map(|i| if i % 2 == 0 { CellType::Positive } else { CellType::Negative })
            .collect();

        assert!(!criterion(&positions, &types, 0.1, TARGET_CELL_COUNT));
    }

    #[test]
    fn test_criterion_rejects_dense_subvolume() {
        // 50000 cells packed inside the subvolume: occupancy 5.0, above 4.
        let mut rng = StdRng::seed_from_u64(2);
        let positions = blob(&mut rng, Vec3::new(0.5, 0.5, 0.5), 0.05, 50_000);
        let types = vec![CellType::Positive; 50_000];

        assert!(!criterion(&positions, &types, 0.1, TARGET_CELL_COUNT));
    }

    #[test]
    fn test_criterion_rejects_mixed_types() {
        // One tight blob of both types: every pair is close and half the
        // pairs mix types.
        let mut rng = StdRng::seed_from_u64(3);
        let positions = blob(&mut rng, Vec3::new(0.5, 0.5, 0.5), 0.02, 3000);
        let types: Vec<CellType> = (0..3000)
            .map(|i| if i % 2 == 0 { CellType::Positive } else { CellType::Negative })
            .collect();

        assert!(!criterion(&positions, &types, 0.1, TARGET_CELL_COUNT));
    }

    #[test]
    fn test_criterion_rejects_small_clusters() {
        // Uniformly spread cells with a tiny spatial range: almost no close
        // pairs, so the average neighbor count is far below 100.
        let mut rng = StdRng::seed_from_u64(4);
        let positions = uniform_positions(&mut rng, 3000);
        let types = vec![CellType::Positive; 3000];

        assert!(!criterion(&positions, &types, 0.01, TARGET_CELL_COUNT));
    }

    #[test]
    fn test_criterion_accepts_separated_clusters() {
        // Two tight single-type blobs further apart than the spatial range.
        let mut rng = StdRng::seed_from_u64(5);
        let mut positions = blob(&mut rng, Vec3::new(0.4, 0.5, 0.5), 0.02, 1500);
        positions.extend(blob(&mut rng, Vec3::new(0.6, 0.5, 0.5), 0.02, 1500));
        let mut types = vec![CellType::Positive; 1500];
        types.extend(vec![CellType::Negative; 1500]);

        assert!(criterion(&positions, &types, 0.1, TARGET_CELL_COUNT));
    }

    #[test]
    fn test_energy_no_close_pairs_is_zero() {
        let positions = vec![Vec3::new(0.3, 0.5, 0.5), Vec3::new(0.7, 0.5, 0.5)];
        let types = vec![CellType::Positive, CellType::Negative];
        assert_eq!(energy(&positions, &types, 0.1, TARGET_CELL_COUNT), 0.0);
    }

    #[test]
    fn test_energy_separated_clusters_is_negative() {
        // Opposite-type clusters separated beyond the spatial range: the
        // extra-cluster sum stays zero and only intra-cluster energy remains.
        let mut rng = StdRng::seed_from_u64(6);
        let mut positions = blob(&mut rng, Vec3::new(0.4, 0.5, 0.5), 0.02, 400);
        positions.extend(blob(&mut rng, Vec3::new(0.6, 0.5, 0.5), 0.02, 400));
        let mut types = vec![CellType::Positive; 400];
        types.extend(vec![CellType::Negative; 400]);

        assert!(energy(&positions, &types, 0.1, TARGET_CELL_COUNT) < 0.0);
    }

    #[test]
    fn test_energy_same_type_is_non_positive() {
        let mut rng = StdRng::seed_from_u64(7);
        let positions = blob(&mut rng, Vec3::new(0.5, 0.5, 0.5), 0.03, 500);
        let types = vec![CellType::Positive; 500];

        assert!(energy(&positions, &types, 0.1, TARGET_CELL_COUNT) <= 0.0);
    }

    #[test]
    fn test_energy_caps_coincident_pair() {
        // Two opposite-type cells at the same point: the pair contribution is
        // capped at 100 and lands in the extra-cluster sum.
        let positions = vec![Vec3::new(0.5, 0.5, 0.5); 2];
        let types = vec![CellType::Positive, CellType::Negative];

        let value = energy(&positions, &types, 0.1, TARGET_CELL_COUNT);
        assert!((value - 100.0 / 101.0).abs() < 1e-5);
    }
}
