use clap::Parser;
use srgan::{
    cli::{Cli, Commands},
    experiment::{run_evaluate, run_fsrcnn, run_srgan},
    SrError,
};

fn dispatch<B: burn::tensor::backend::AutodiffBackend>(
    cli: Cli,
    device: B::Device,
) -> Result<(), SrError> {
    match cli.command {
        Commands::TrainSrgan {
            common,
            vgg_weights,
        } => {
            let config = common.srgan_config()?;
            let report = run_srgan::<B>(
                &config,
                &common.data_dir,
                &common.artifact_dir,
                vgg_weights.as_deref(),
                device,
            )?;
            log::info!(
                "Trained {} epochs, test PSNR {:.3} dB",
                report.history.epochs.len(),
                report.evaluation.mean_psnr
            );
        }
        Commands::TrainFsrcnn { common } => {
            let config = common.fsrcnn_config()?;
            let report =
                run_fsrcnn::<B>(&config, &common.data_dir, &common.artifact_dir, device)?;
            log::info!(
                "Trained {} epochs, test PSNR {:.3} dB",
                report.history.epochs.len(),
                report.evaluation.mean_psnr
            );
        }
        Commands::Evaluate {
            model,
            data_dir,
            artifact_dir,
        } => {
            run_evaluate::<B::InnerBackend>(model, &data_dir, &artifact_dir, device)?;
        }
    }

    Ok(())
}

#[cfg(feature = "ndarray")]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };
    use srgan::{cli::Cli, SrError};

    pub fn run(cli: Cli) -> Result<(), SrError> {
        super::dispatch::<Autodiff<NdArray>>(cli, NdArrayDevice::Cpu)
    }
}

#[cfg(feature = "tch-gpu")]
mod tch_gpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use srgan::{cli::Cli, SrError};

    pub fn run(cli: Cli) -> Result<(), SrError> {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        super::dispatch::<Autodiff<LibTorch>>(cli, device)
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use srgan::{cli::Cli, SrError};

    pub fn run(cli: Cli) -> Result<(), SrError> {
        super::dispatch::<Autodiff<LibTorch>>(cli, LibTorchDevice::Cpu)
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };
    use srgan::{cli::Cli, SrError};

    pub fn run(cli: Cli) -> Result<(), SrError> {
        super::dispatch::<Autodiff<Wgpu>>(cli, WgpuDevice::default())
    }
}

#[cfg(not(any(
    feature = "ndarray",
    feature = "tch-gpu",
    feature = "tch-cpu",
    feature = "wgpu"
)))]
compile_error!("enable a backend feature: ndarray, tch-gpu, tch-cpu or wgpu");

fn main() {
    let cli = Cli::parse();

    #[cfg(feature = "ndarray")]
    let result = ndarray::run(cli);
    #[cfg(all(feature = "tch-gpu", not(feature = "ndarray")))]
    let result = tch_gpu::run(cli);
    #[cfg(all(feature = "tch-cpu", not(feature = "ndarray"), not(feature = "tch-gpu")))]
    let result = tch_cpu::run(cli);
    #[cfg(all(
        feature = "wgpu",
        not(feature = "ndarray"),
        not(feature = "tch-gpu"),
        not(feature = "tch-cpu")
    ))]
    let result = wgpu::run(cli);

    if let Err(err) = result {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
