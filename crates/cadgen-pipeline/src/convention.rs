//! The calling convention generated programs must follow

use std::fmt::Write as _;

/// Everything the pipeline assumes about the target CAD scripting library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convention {
    /// Fence language tag
    pub language: &'static str,
    /// Module name imported by every program
    pub module: &'static str,
    /// Builder context manager the solid is created in
    pub builder: &'static str,
    /// Binding the program must assign its builder to
    pub result_binding: &'static str,
    /// Attribute on the binding holding the finished solid
    pub result_attribute: &'static str,
    /// Boundary-representation export path
    pub step_output: &'static str,
    /// Mesh export path
    pub mesh_output: &'static str,
}

impl Convention {
    /// build123d with `with BuildPart() as part:` and exports under `output/`
    pub const fn build123d() -> Self {
        Self {
            language: "python",
            module: "build123d",
            builder: "BuildPart",
            result_binding: "part",
            result_attribute: "part",
            step_output: "output/llm_output.step",
            mesh_output: "output/llm_output.stl",
        }
    }

    /// Prefix that starts a wildcard import, e.g. `from build123d import`
    pub fn import_marker(&self) -> String {
        format!("from {} import", self.module)
    }

    /// Substrings of which at least one must appear in a plausible program
    pub fn domain_markers(&self) -> [String; 2] {
        [format!("from {}", self.module), self.builder.to_string()]
    }

    /// Directory both exports are written into
    pub fn output_dir(&self) -> &'static str {
        self.mesh_output
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or(".")
    }

    /// File extension of the mesh export
    pub fn mesh_extension(&self) -> &'static str {
        self.mesh_output
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or("stl")
    }

    /// Instruction text sent on the provider's system channel
    pub fn system_prompt(&self) -> String {
        let Convention {
            language,
            module,
            builder,
            result_binding: part,
            result_attribute: attr,
            step_output,
            mesh_output,
        } = self;

        let mut prompt = String::new();
        let _ = writeln!(
            prompt,
            "You are an expert in {module}. Write {language} code following these rules."
        );
        prompt.push('\n');
        prompt.push_str("Rules:\n");
        let _ = writeln!(prompt, "1. Always import with `from {module} import *`");
        let _ = writeln!(
            prompt,
            "2. Build the shape inside the context manager `with {builder}() as {part}:`"
        );
        prompt.push_str("3. Give every dimension in millimetres\n");
        prompt.push_str("4. Collect parameters as variables at the top of the program\n");
        prompt.push_str(
            "5. Booleans: mode=Mode.SUBTRACT for holes, mode=Mode.ADD for unions\n",
        );
        prompt.push_str("6. Do not nest BuildSketch\n");
        prompt.push_str(
            "7. Call fillet/chamfer last, after the shape is complete, as global functions\n",
        );
        prompt.push_str("8. Always finish with these two lines:\n");
        let _ = writeln!(prompt, "   export_step({part}.{attr}, \"{step_output}\")");
        let _ = writeln!(prompt, "   export_stl({part}.{attr}, \"{mesh_output}\")");
        let _ = writeln!(
            prompt,
            "9. MOST IMPORTANT: return only a code block (```{language} ... ```), no explanation."
        );
        prompt.push('\n');
        prompt.push_str("Correct fillet usage:\n");
        let _ = writeln!(
            prompt,
            "fillet({part}.edges(), radius=5)   # global function taking {part}.edges()"
        );
        let _ = writeln!(prompt, "# {part}.fillet(...)  <- wrong, the method does not exist");
        prompt.push('\n');
        prompt.push_str("Forbidden: filter_by_orientation / filter_by_axis do not exist\n");
        prompt.push_str("Instead, select specific edges with filter_by_position(Axis.Z, min, max)\n");
        prompt
    }
}

impl Default for Convention {
    fn default() -> Self {
        Self::build123d()
    }
}
