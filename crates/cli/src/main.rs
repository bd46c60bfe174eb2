use image_cropper_core::{
    aspect::AspectRatio,
    config::Config,
    detection::{DetectionBox, SuppliedDetector},
    geometry::{CropRect, Dimensions, map_to_source_crop},
    init,
    session::{CommitOutcome, CropEvent},
    settings::Settings,
    upload::UploadedImage,
    ImageCropper,
};
use anyhow::{Context, Result, bail};
use arboard::{Clipboard, ImageData};
use clap::Parser;
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Preview width used when `--display` is not given.
const DEFAULT_DISPLAY_WIDTH: f64 = 800.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Crop a JPG or PNG to 1:1, 4:5 or 16:9", long_about = None)]
struct Args {
    /// Image to crop (.jpg, .jpeg or .png)
    input: PathBuf,

    /// Output ratio: 1:1, 4:5 or 16:9 (defaults to the remembered one)
    #[arg(short, long)]
    aspect: Option<AspectRatio>,

    /// Preview size the selection refers to, as WxH
    #[arg(long, value_parser = parse_size)]
    display: Option<(f64, f64)>,

    /// Face box in source pixels as X,Y,W,H; the first one seeds the crop
    #[arg(long, value_parser = parse_box)]
    face: Vec<DetectionBox>,

    /// Selection in preview pixels as X,Y,W,H
    #[arg(short, long, value_parser = parse_box)]
    select: Option<DetectionBox>,

    /// Where to write the JPEG (defaults to the configured filename)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the result as a data: URL
    #[arg(long, default_value_t = false)]
    data_url: bool,

    /// Print the source crop as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Copy the cropped image to the clipboard
    #[arg(short, long, default_value_t = false)]
    copy: bool,

    /// Remember the chosen ratio for next time
    #[arg(long, default_value_t = false)]
    remember: bool,
}

fn parse_numbers<const N: usize>(s: &str, sep: char) -> Result<[f64; N], String> {
    let parts: Vec<f64> = s
        .split(sep)
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<_, _>>()?;
    parts
        .try_into()
        .map_err(|_| format!("expected {N} values separated by '{sep}'"))
}

fn parse_size(s: &str) -> Result<(f64, f64), String> {
    let [w, h] = parse_numbers::<2>(&s.to_ascii_lowercase(), 'x')?;
    if !(w > 0.0 && h > 0.0) {
        return Err("display size must be positive".into());
    }
    Ok((w, h))
}

fn parse_box(s: &str) -> Result<DetectionBox, String> {
    let [x, y, w, h] = parse_numbers::<4>(s, ',')?;
    Ok(DetectionBox::new(x, y, w, h))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup
    init();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    // Environment first, then remembered settings, then flags
    let config = Config::load().context("Failed to load configuration")?;
    let mut settings = Settings::load(&config);
    let mut config: Config = settings.apply(&config);
    if let Some(aspect) = args.aspect {
        config.default_aspect = aspect;
    }
    let aspect = config.default_aspect;

    let upload = UploadedImage::open(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    let display = args.display.unwrap_or_else(|| {
        let fitted = Dimensions::fit_width(upload.width(), upload.height(), DEFAULT_DISPLAY_WIDTH);
        (fitted.display_width, fitted.display_height)
    });

    let mut cropper = ImageCropper::with_config(config);
    if !args.face.is_empty() {
        cropper = cropper.with_detector(Arc::new(SuppliedDetector::new(args.face.clone())));
    }
    cropper.open(upload, Some(display)).await?;

    let outcome = match args.select {
        Some(b) => {
            let rect = CropRect::pixels(b.x, b.y, b.width, b.height);
            cropper.dispatch(CropEvent::CropChanged(rect))?;
            cropper
                .dispatch(CropEvent::CropCompleted(rect))
                .context("Failed to render crop")?
                .unwrap_or(CommitOutcome::NotReady)
        }
        None => cropper.commit(None).await.context("Failed to render crop")?,
    };

    match outcome {
        CommitOutcome::Committed(handle) => tracing::debug!(%handle, "committed"),
        CommitOutcome::Incomplete => bail!("Selection has zero width or height"),
        CommitOutcome::NotReady => bail!("Display size is not usable"),
        CommitOutcome::Discarded => bail!("Crop was superseded"),
    }

    let session = cropper.session();
    let Some(artifact) = session.artifact() else {
        bail!("No cropped image was produced");
    };
    let (width, height) = artifact.dimensions();

    // Output
    let download = cropper.download()?;
    let path = args.output.clone().unwrap_or_else(|| PathBuf::from(&download.filename));
    std::fs::write(&path, &download.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if args.json {
        let (Some(dims), Some(crop)) = (session.dimensions(), session.crop()) else {
            bail!("Session lost its crop");
        };
        let source = map_to_source_crop(dims, crop, aspect.value())?;
        let report = serde_json::json!({
            "aspect": aspect.label(),
            "source": source,
            "output": { "path": path, "width": width, "height": height },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if args.data_url {
        println!("{}", artifact.data_url());
    }
    if !args.json && !args.data_url {
        println!("Saved {} ({}x{}, {})", path.display(), width, height, aspect);
    }

    // Copy to clipboard if requested
    if args.copy {
        let rgba = image::load_from_memory(artifact.bytes())?.to_rgba8();
        let image = ImageData {
            width: rgba.width() as usize,
            height: rgba.height() as usize,
            bytes: Cow::Owned(rgba.into_raw()),
        };
        match Clipboard::new() {
            Ok(mut clipboard) => {
                if let Err(e) = clipboard.set_image(image) {
                    eprintln!("Warning: Failed to copy to clipboard: {}", e);
                } else {
                    eprintln!("(Copied to clipboard)");
                }
            }
            Err(e) => eprintln!("Warning: Could not access clipboard: {}", e),
        }
    }

    if args.remember {
        settings.aspect = aspect;
        settings.save().context("Failed to save settings")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_display_size() {
        assert_eq!(parse_size("800x600").unwrap(), (800.0, 600.0));
        assert_eq!(parse_size("640X480").unwrap(), (640.0, 480.0));
        assert!(parse_size("800").is_err());
        assert!(parse_size("0x600").is_err());
    }

    #[test]
    fn parses_boxes() {
        assert_eq!(parse_box("1, 2,3,4.5").unwrap(), DetectionBox::new(1.0, 2.0, 3.0, 4.5));
        assert!(parse_box("1,2,3").is_err());
        assert!(parse_box("a,b,c,d").is_err());
    }

    #[test]
    fn parses_full_command_line() {
        let args = Args::try_parse_from([
            "image-cropper",
            "in.png",
            "--aspect",
            "16:9",
            "--face",
            "10,10,50,50",
            "--face",
            "0,0,1,1",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.aspect, Some(AspectRatio::Landscape));
        assert_eq!(args.face.len(), 2);
        assert!(args.json);
        assert!(args.select.is_none());
    }
}
