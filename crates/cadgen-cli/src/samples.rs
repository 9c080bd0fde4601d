//! Bundled sample programs that run without a model

/// A ready-made program
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub code: &'static str,
}

pub const SAMPLES: &[Sample] = &[
    Sample {
        id: "box",
        label: "Basic box",
        description: "Box 100 x 50 x 30 mm",
        code: r#"from build123d import *

length, width, height = 100, 50, 30

with BuildPart() as part:
    Box(length, width, height)

export_step(part.part, "output/sample_box.step")
export_stl(part.part, "output/sample_box.stl")
print(f"Box: volume={part.part.volume:.1f} mm^3")
"#,
    },
    Sample {
        id: "union",
        label: "Boolean union",
        description: "Cylinder r15 x 40 mm standing on a 60 x 60 x 20 mm box",
        code: r#"from build123d import *

with BuildPart() as part:
    Box(60, 60, 20)
    Cylinder(radius=15, height=40)

export_step(part.part, "output/sample_union.step")
export_stl(part.part, "output/sample_union.stl")
print(f"Union: volume={part.part.volume:.1f} mm^3")
"#,
    },
    Sample {
        id: "subtract",
        label: "Boolean subtract",
        description: "80 x 80 x 30 mm block with a 40 mm through hole",
        code: r#"from build123d import *

with BuildPart() as part:
    Box(80, 80, 30)
    Cylinder(radius=20, height=30, mode=Mode.SUBTRACT)

export_step(part.part, "output/sample_subtract.step")
export_stl(part.part, "output/sample_subtract.stl")
print(f"Subtract: volume={part.part.volume:.1f} mm^3")
"#,
    },
    Sample {
        id: "bolt_plate",
        label: "Bolt hole plate",
        description: "100 x 100 x 15 mm plate, four 10 mm holes on a 70 mm grid",
        code: r#"from build123d import *

plate, thickness = 100, 15
pitch, hole_dia = 70, 10

with BuildPart() as part:
    Box(plate, plate, thickness)
    with GridLocations(pitch, pitch, 2, 2):
        Cylinder(radius=hole_dia / 2, height=thickness, mode=Mode.SUBTRACT)

export_step(part.part, "output/sample_bolt_plate.step")
export_stl(part.part, "output/sample_bolt_plate.stl")
print(f"Bolt plate: volume={part.part.volume:.1f} mm^3")
"#,
    },
    Sample {
        id: "fillet",
        label: "Filleted block",
        description: "80 x 60 x 25 mm block with every edge rounded R5",
        code: r#"from build123d import *

with BuildPart() as part:
    Box(80, 60, 25)
    fillet(part.edges(), radius=5)

export_step(part.part, "output/sample_fillet.step")
export_stl(part.part, "output/sample_fillet.stl")
print(f"Fillet R5: volume={part.part.volume:.1f} mm^3")
"#,
    },
    Sample {
        id: "flange_shaft",
        label: "Flanged shaft",
        description: "30 mm shaft, 120 mm long, on an 80 mm flange with 4 x 10 mm bolt holes",
        code: r#"from build123d import *

shaft_diameter = 30
shaft_length = 120
flange_diameter = 80
flange_thickness = 15
bolt_hole_dia = 10
bolt_pcd = 60
n_bolts = 4
fillet_r = 3

with BuildPart() as part:
    Cylinder(radius=shaft_diameter / 2, height=shaft_length)
    with Locations((0, 0, -shaft_length / 2 + flange_thickness / 2)):
        Cylinder(radius=flange_diameter / 2, height=flange_thickness)
        with PolarLocations(bolt_pcd / 2, n_bolts):
            Cylinder(radius=bolt_hole_dia / 2, height=flange_thickness, mode=Mode.SUBTRACT)
    root = -shaft_length / 2 + flange_thickness
    fillet(part.edges().filter_by_position(Axis.Z, root, root + 1), radius=fillet_r)

export_step(part.part, "output/sample_flange_shaft.step")
export_stl(part.part, "output/sample_flange_shaft.stl")
print(f"Flanged shaft: volume={part.part.volume:.1f} mm^3")
"#,
    },
];

/// Look up a sample by id (case-insensitive)
pub fn find(id: &str) -> Option<&'static Sample> {
    let id = id.trim();
    SAMPLES.iter().find(|s| s.id.eq_ignore_ascii_case(id))
}

/// One line per sample
pub fn listing() -> String {
    let mut output = String::from("Samples:\n");
    for sample in SAMPLES {
        output.push_str(&format!("  {:<14} {}: {}\n", sample.id, sample.label, sample.description));
    }
    output.push_str("\nRun with: /sample <id>");
    output
}
