use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::style::{Color, Stylize};
use image::{DynamicImage, GenericImageView};
use reqwest::Client;
use tracing::debug;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Album art as truecolor half blocks 🎨
pub struct ArtworkRenderer {
    client: Client,
}

impl ArtworkRenderer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn fetch_image(&self, url: &str) -> Result<DynamicImage> {
        let bytes = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .context("artwork request failed")?
            .error_for_status()?
            .bytes()
            .await?;
        let img = image::load_from_memory(&bytes).context("artwork is not a readable image")?;
        debug!(url, width = img.width(), height = img.height(), "Artwork decoded");
        Ok(img)
    }

    pub async fn render_url(&self, url: &str, width: u32) -> Result<Vec<String>> {
        let img = self.fetch_image(url).await?;
        Ok(Self::render(&img, width))
    }

    /// Pixel rows needed for `width` columns, rounded up to an even count
    /// since each text row shows two of them.
    pub fn pixel_height(img: &DynamicImage, width: u32) -> u32 {
        let (w, h) = img.dimensions();
        if w == 0 {
            return 0;
        }
        let height = (u64::from(width) * u64::from(h) / u64::from(w)) as u32;
        height + height % 2
    }

    /// One string per text row: `▀` with the top pixel as foreground and the
    /// bottom pixel as background.
    pub fn render(img: &DynamicImage, width: u32) -> Vec<String> {
        let height = Self::pixel_height(img, width);
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let resized = img
            .resize_exact(width, height, image::imageops::FilterType::Triangle)
            .to_rgb8();

        (0..height)
            .step_by(2)
            .map(|y| {
                (0..width)
                    .map(|x| {
                        let top = resized.get_pixel(x, y);
                        let bottom = resized.get_pixel(x, y + 1);
                        "▀".with(Color::Rgb {
                            r: top[0],
                            g: top[1],
                            b: top[2],
                        })
                        .on(Color::Rgb {
                            r: bottom[0],
                            g: bottom[1],
                            b: bottom[2],
                        })
                        .to_string()
                    })
                    .collect()
            })
            .collect()
    }
}
