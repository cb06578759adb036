//! Point, line and polygon containment.
//!
//! Uses the even-odd ray casting rule. A point exactly on an edge has
//! unspecified parity. Holes are not considered: only the outer ring of a
//! polygon takes part in the test.

use crisis_types::{Geometry, Position};

/// Ray casting test of `point` against a single closed or open ring.
pub fn point_in_ring(point: Position, ring: &[Position]) -> bool {
    let Some(last) = ring.last() else {
        return false;
    };
    let (x, y) = (point.lon, point.lat);
    let mut inside = false;
    let mut prev = *last;
    for vertex in ring {
        let (xi, yi) = (vertex.lon, vertex.lat);
        let (xj, yj) = (prev.lon, prev.lat);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        prev = *vertex;
    }
    inside
}

/// Containment in a polygon given as rings; only the outer ring counts.
pub fn point_in_polygon(point: Position, rings: &[Vec<Position>]) -> bool {
    rings.first().is_some_and(|outer| point_in_ring(point, outer))
}

/// A line is inside when any of its vertices is inside.
pub fn line_in_polygon(line: &[Position], rings: &[Vec<Position>]) -> bool {
    line.iter().any(|p| point_in_polygon(*p, rings))
}

/// Multi-polygon containment as the XOR of per-polygon containment.
///
/// A point covered by an even number of member polygons is reported outside.
pub fn multi_polygon_contains(point: Position, polygons: &[Vec<Vec<Position>>]) -> bool {
    polygons
        .iter()
        .fold(false, |inside, polygon| inside ^ point_in_polygon(point, polygon))
}

/// Whether an entity geometry lies in an area geometry.
///
/// Lines and multi-points use vertex sampling. Areas that are not polygons
/// contain nothing.
pub fn geometry_in_area(geometry: &Geometry, area: &Geometry) -> bool {
    let contains = |p: Position| match area {
        Geometry::Polygon(rings) => point_in_polygon(p, rings),
        Geometry::MultiPolygon(polygons) => multi_polygon_contains(p, polygons),
        Geometry::Point(_)
        | Geometry::MultiPoint(_)
        | Geometry::LineString(_)
        | Geometry::MultiLineString(_) => false,
    };
    match geometry {
        Geometry::Point(p) => contains(*p),
        Geometry::MultiPoint(points) | Geometry::LineString(points) => {
            points.iter().any(|p| contains(*p))
        }
        Geometry::MultiLineString(lines) => lines.iter().flatten().any(|p| contains(*p)),
        Geometry::Polygon(rings) => rings.iter().flatten().any(|p| contains(*p)),
        Geometry::MultiPolygon(polygons) => {
            polygons.iter().flatten().flatten().any(|p| contains(*p))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Vec<Position>> {
        vec![vec![
            Position::new(0.0, 0.0),
            Position::new(0.0, 1.0),
            Position::new(1.0, 1.0),
            Position::new(1.0, 0.0),
        ]]
    }

    #[test]
    fn centre_inside_far_point_outside() {
        let square = unit_square();
        assert!(point_in_polygon(Position::new(0.5, 0.5), &square));
        assert!(!point_in_polygon(Position::new(2.0, 2.0), &square));
    }

    #[test]
    fn empty_polygon_contains_nothing() {
        assert!(!point_in_polygon(Position::new(0.5, 0.5), &[]));
        assert!(!point_in_ring(Position::new(0.5, 0.5), &[]));
    }

    #[test]
    fn overlapping_multi_polygon_cancels_out() {
        // Documented quirk: two identical members cancel each other.
        let twice = vec![unit_square(), unit_square()];
        assert!(!multi_polygon_contains(Position::new(0.5, 0.5), &twice));

        let once = vec![unit_square()];
        assert!(multi_polygon_contains(Position::new(0.5, 0.5), &once));
    }

    #[test]
    fn line_inside_when_any_vertex_inside() {
        let square = unit_square();
        let crossing = [Position::new(-1.0, 0.5), Position::new(0.5, 0.5)];
        let spanning = [Position::new(-1.0, 0.5), Position::new(2.0, 0.5)];
        assert!(line_in_polygon(&crossing, &square));
        // Vertex sampling: a segment crossing the area with no vertex inside is outside.
        assert!(!line_in_polygon(&spanning, &square));
    }

    #[test]
    fn geometry_dispatch() {
        let area = Geometry::Polygon(unit_square());
        assert!(geometry_in_area(&Geometry::Point(Position::new(0.2, 0.2)), &area));
        assert!(!geometry_in_area(
            &Geometry::Point(Position::new(0.2, 0.2)),
            &Geometry::Point(Position::new(0.2, 0.2))
        ));
    }
}
