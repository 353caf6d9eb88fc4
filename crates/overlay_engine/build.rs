// build.rs
// Compiles the overlay GLSL shaders to SPIR-V ahead of pipeline creation

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 2] = ["vert", "frag"];

/// Locate glslc: the Vulkan SDK first, then whatever is on PATH
fn find_glslc() -> Option<String> {
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if let Ok(sdk) = env::var("VULKAN_SDK") {
        let glslc = if cfg!(target_os = "windows") {
            format!("{}\\Bin\\glslc.exe", sdk)
        } else {
            format!("{}/bin/glslc", sdk)
        };
        if Path::new(&glslc).exists() {
            return Some(glslc);
        }
        eprintln!("warning: glslc not found at: {}", glslc);
    }

    match Command::new("glslc").arg("--version").output() {
        Ok(output) if output.status.success() => Some("glslc".to_string()),
        _ => None,
    }
}

fn needs_compile(source: &Path, output: &Path) -> bool {
    match (std::fs::metadata(source), std::fs::metadata(output)) {
        (Ok(src_meta), Ok(dst_meta)) => match (src_meta.modified(), dst_meta.modified()) {
            (Ok(src), Ok(dst)) => src > dst,
            _ => true,
        },
        _ => true,
    }
}

fn main() {
    println!("cargo:rerun-if-changed=../../resources/shaders");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Some(glslc) = find_glslc() else {
        eprintln!("warning: glslc not available, shader compilation skipped");
        eprintln!("hint: Install the Vulkan SDK and set VULKAN_SDK, or put glslc on PATH");
        return;
    };

    let shader_dir = PathBuf::from("../../resources/shaders");
    let target_dir = PathBuf::from("../../target/shaders");

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create target directory: {}", e);
        return;
    }

    let shader_files = match std::fs::read_dir(&shader_dir) {
        Ok(files) => files,
        Err(_) => {
            eprintln!("info: No shader directory found at: {:?}", shader_dir);
            return;
        }
    };

    let mut compiled_count = 0;
    for entry in shader_files.flatten() {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !SHADER_EXTENSIONS.contains(&ext) {
            continue;
        }

        // triangle.vert -> triangle.vert.spv keeps stage pairs from colliding
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let out_file = target_dir.join(format!("{}.spv", file_name));

        if !needs_compile(&path, &out_file) {
            eprintln!("info: Shader {} is up to date", file_name);
            continue;
        }

        let status = Command::new(&glslc)
            .arg(&path)
            .arg("-o")
            .arg(&out_file)
            .status();

        match status {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {} -> {:?}", file_name, out_file);
                compiled_count += 1;
            }
            Ok(s) => {
                eprintln!("error: glslc failed for {:?} with exit code: {}", path, s.code().unwrap_or(-1));
                panic!("Shader compilation failed");
            }
            Err(e) => {
                eprintln!("error: Failed to run glslc for {:?}: {}", path, e);
                panic!("Failed to execute shader compiler");
            }
        }
    }

    if compiled_count > 0 {
        eprintln!("info: Successfully compiled {} shader(s)", compiled_count);
    }
}
