// Native Build Plan
// The external commands a native runner build issues, in order

use super::args::{BuildTarget, NativeBuildArgs};
use crate::config::ServiceConfig;
use crate::runners::StepCommand;

use std::path::{Path, PathBuf};

/// Python one-liner printing the CMake prefix of the installed torch
pub const TORCH_PREFIX_PROBE: &str = "import torch;print(torch.utils.cmake_prefix_path)";

/// `git submodule update --init` then `git submodule sync`
pub fn submodule_commands(config: &ServiceConfig) -> Vec<StepCommand> {
    [["submodule", "update", "--init"].as_slice(), ["submodule", "sync"].as_slice()]
        .into_iter()
        .map(|args| {
            StepCommand::new(
                config.commands.git.clone(),
                args.iter().map(|a| a.to_string()).collect(),
                &config.root,
            )
        })
        .collect()
}

/// Where an ExecuTorch install is expected
pub fn executorch_install_dir(config: &ServiceConfig) -> PathBuf {
    config.root.join(&config.et_build_dir).join("install")
}

/// Whether the ExecuTorch install step runs for this build
pub fn needs_executorch_install(args: &NativeBuildArgs, config: &ServiceConfig) -> bool {
    args.target == BuildTarget::Et && args.install_et && !executorch_install_dir(config).exists()
}

pub fn executorch_install_command(config: &ServiceConfig) -> StepCommand {
    config
        .commands
        .install_executorch
        .to_command(Vec::<String>::new(), &config.root)
}

pub fn torch_prefix_probe(config: &ServiceConfig) -> StepCommand {
    StepCommand::new(
        config.commands.python.clone(),
        vec!["-c".to_string(), TORCH_PREFIX_PROBE.to_string()],
        &config.root,
    )
}

/// `./cmake-out` style output directory, relative to the root unless configured absolute
fn cmake_out(config: &ServiceConfig) -> String {
    Path::new(".").join(&config.cmake_out_dir).display().to_string()
}

/// The CMake configure invocation
pub fn configure_command(
    args: &NativeBuildArgs,
    config: &ServiceConfig,
    torch_prefix: &str,
) -> StepCommand {
    let mut cmake_args = vec![
        "-S".to_string(),
        ".".to_string(),
        "-B".to_string(),
        cmake_out(config),
        format!("-DCMAKE_PREFIX_PATH={}", torch_prefix),
        format!(
            "-DLINK_TORCHAO={}",
            if args.link_torchao { "ON" } else { "OFF" }
        ),
    ];
    if args.target == BuildTarget::Et {
        cmake_args.push("-DET_USE_ADAPTIVE_THREADS=ON".to_string());
    }
    cmake_args.push(format!(
        "-DCMAKE_CXX_FLAGS=-D_GLIBCXX_USE_CXX11_ABI={}",
        args.target.cxx11_abi()
    ));
    cmake_args.push("-G".to_string());
    cmake_args.push("Ninja".to_string());

    StepCommand::new(config.commands.cmake.clone(), cmake_args, &config.root)
}

/// `cmake --build ./cmake-out --target <target>_run`
pub fn build_command(args: &NativeBuildArgs, config: &ServiceConfig) -> StepCommand {
    StepCommand::new(
        config.commands.cmake.clone(),
        vec![
            "--build".to_string(),
            cmake_out(config),
            "--target".to_string(),
            args.target.artifact_name(),
        ],
        &config.root,
    )
}

/// Path of the produced runner executable
pub fn artifact_path(args: &NativeBuildArgs, config: &ServiceConfig) -> PathBuf {
    config
        .root
        .join(&config.cmake_out_dir)
        .join(args.target.artifact_name())
}
