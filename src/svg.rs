use crate::grid::{Knowledge, KnowledgeGrid};
use crate::referee::World;
use crate::types::{Cell, CellValue};
use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Path, Rectangle, Text};

const CELL: f64 = 40.0;

fn color(k: Knowledge) -> &'static str {
    match k {
        Knowledge::Unknown => "#c0c0c0",
        Knowledge::KnownEmptyOfAgents => "#e8e8e8",
        Knowledge::Known(v) => match v {
            CellValue::Empty => "#ffffff",
            CellValue::Wall => "#404040",
            CellValue::Guard(_) => "#ff8080",
            CellValue::Civilian(_) => "#80ff80",
            CellValue::Target => "#ffff80",
            CellValue::Disguise => "#8080ff",
            CellValue::Weapon => "#ffb060",
        },
    }
}

fn label(k: Knowledge) -> String {
    match k {
        Knowledge::Unknown => "?".to_owned(),
        Knowledge::KnownEmptyOfAgents => String::new(),
        Knowledge::Known(CellValue::Empty) => String::new(),
        Knowledge::Known(v) => v.to_string(),
    }
}

/// Top-left corner of `cell` in picture coordinates; north is up.
fn corner(cell: Cell, height: i32) -> (f64, f64) {
    (cell.x as f64 * CELL, (height - 1 - cell.y) as f64 * CELL)
}

fn center(cell: Cell, height: i32) -> (f64, f64) {
    let (x, y) = corner(cell, height);
    (x + CELL / 2.0, y + CELL / 2.0)
}

fn render_cells(width: i32, height: i32, knowledge: impl Fn(Cell) -> Knowledge, threats: &[Cell]) -> Document {
    let mut document = Document::new()
        .set("width", width as f64 * CELL + 20.0)
        .set("height", height as f64 * CELL + 20.0)
        .set("viewBox", (-10.0, -10.0, width as f64 * CELL + 20.0, height as f64 * CELL + 20.0));
    for x in 0..width {
        for y in 0..height {
            let c = Cell::new(x, y);
            let k = knowledge(c);
            let (px, py) = corner(c, height);
            let stroke = if threats.contains(&c) { "red" } else { "black" };
            let rect = Rectangle::new()
                .set("x", px)
                .set("y", py)
                .set("width", CELL)
                .set("height", CELL)
                .set("fill", color(k))
                .set("stroke", stroke)
                .set("stroke-width", 1)
                .set("title", format!("{} {:?}", c, k));
            document = document.add(rect);
            let text = Text::new(label(k))
                .set("x", px + CELL / 2.0)
                .set("y", py + CELL / 2.0 + 6.0)
                .set("text-anchor", "middle")
                .set("font-size", "16px");
            document = document.add(text);
        }
    }
    document
}

/// The knowledge grid, with `path` drawn over it when not empty.
pub fn render(grid: &KnowledgeGrid, path: &[Cell]) -> String {
    let threats = grid.threats().collect::<Vec<_>>();
    let mut document = render_cells(grid.width(), grid.height(), |c| grid.get(c), &threats);
    if let Some((&first, rest)) = path.split_first() {
        let mut data = Data::new().move_to(center(first, grid.height()));
        for &c in rest {
            data = data.line_to(center(c, grid.height()));
        }
        let line = Path::new()
            .set("fill", "none")
            .set("stroke", "#0060ff")
            .set("stroke-width", 3)
            .set("stroke-opacity", 0.6)
            .set("d", data);
        document = document.add(line);
    }
    document.to_string()
}

pub fn render_world(world: &World) -> String {
    render_cells(
        world.width,
        world.height,
        |c| world.get(c).map_or(Knowledge::Unknown, Knowledge::Known),
        &[],
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Orientation;

    #[test]
    fn renders_grid_and_path() {
        let mut g = KnowledgeGrid::new(3, 2).unwrap();
        g.set(Cell::new(0, 0), Knowledge::Known(CellValue::Empty)).unwrap();
        g.set(Cell::new(1, 0), Knowledge::Known(CellValue::Guard(Orientation::N))).unwrap();
        let s = render(&g, &[Cell::new(0, 0), Cell::new(0, 1), Cell::new(1, 1)]);
        assert!(s.starts_with("<svg"));
        assert_eq!(s.matches("<rect").count(), 6);
        assert!(s.contains("#ff8080"));
        assert!(s.contains("<path"));
        assert!(!render(&g, &[]).contains("<path"));
    }

    #[test]
    fn north_is_up() {
        assert_eq!(corner(Cell::new(0, 1), 2), (0.0, 0.0));
        assert_eq!(corner(Cell::new(1, 0), 2), (CELL, CELL));
    }

    #[test]
    fn renders_world() {
        let world = crate::referee::tests::small_world();
        let s = render_world(&world);
        assert_eq!(s.matches("<rect").count(), 12);
        assert!(s.contains("#404040"));
    }
}
