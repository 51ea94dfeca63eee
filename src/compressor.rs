use std::path::Path;
use std::sync::mpsc;

use nalgebra::DMatrix;
use threadpool::ThreadPool;

use crate::channel::{factor_keys, Channel};
use crate::error::Error;
use crate::factor_file::{FactorFileFormat, FactorStore};
use crate::raster::{reader::read_raster, Raster, IMAGE_EXTENSIONS};
use crate::{logger, lowercase_extension, Result};

/// What an input path is taken for, judged by its lower-cased extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Image,
    FactorFile,
    Unrecognized,
}

impl InputKind {
    pub fn of(path: &Path) -> Self {
        match lowercase_extension(path) {
            Some(extension) if IMAGE_EXTENSIONS.contains(&extension.as_str()) => Self::Image,
            Some(extension) if FactorFileFormat::from_extension(&extension).is_some() => {
                Self::FactorFile
            }
            _ => Self::Unrecognized,
        }
    }
}

pub fn is_image(path: &Path) -> bool {
    InputKind::of(path) == InputKind::Image
}

pub fn is_factor_file(path: &Path) -> bool {
    InputKind::of(path) == InputKind::FactorFile
}

pub fn is_valid(path: &Path) -> bool {
    InputKind::of(path) != InputKind::Unrecognized
}

/// One decomposed [`Channel`] per image plane.
#[derive(Clone, Debug, PartialEq)]
pub struct Compressor {
    channels: Vec<Channel>,
}

impl Compressor {
    /// Decomposes an image or restores the factors of a factor file.
    pub fn open(path: &Path) -> Result<Self> {
        Self::load(path, None)
    }

    /// Like [`Compressor::open`], but the planes of an image are decomposed on
    /// `threadpool`.
    pub fn open_with(path: &Path, threadpool: &ThreadPool) -> Result<Self> {
        Self::load(path, Some(threadpool))
    }

    fn load(path: &Path, threadpool: Option<&ThreadPool>) -> Result<Self> {
        let channels = match InputKind::of(path) {
            InputKind::Image => Self::load_image(path, threadpool)?,
            InputKind::FactorFile => Self::load_channels(path)?,
            InputKind::Unrecognized => {
                return Err(Error::UnrecognizedFileExtension(path.display().to_string()))
            }
        };
        Ok(Self { channels })
    }

    fn load_image(path: &Path, threadpool: Option<&ThreadPool>) -> Result<Vec<Channel>> {
        let planes = read_raster(path)?.into_planes();
        let channels = match threadpool {
            Some(threadpool) => Self::decompose_on(threadpool, planes)?,
            None => planes
                .into_iter()
                .map(Channel::decompose)
                .collect::<Result<Vec<Channel>>>()?,
        };
        for (index, channel) in channels.iter().enumerate() {
            log_channel(index, channel);
        }
        Ok(channels)
    }

    fn decompose_on(threadpool: &ThreadPool, planes: Vec<DMatrix<f64>>) -> Result<Vec<Channel>> {
        let plane_count = planes.len();
        let (sender, receiver) = mpsc::channel();
        for (index, plane) in planes.into_iter().enumerate() {
            let sender = sender.clone();
            threadpool.execute(move || {
                // the receiver is gone once another plane failed
                let _ = sender.send((index, Channel::decompose(plane)));
            });
        }
        drop(sender);

        let mut slots: Vec<Option<Channel>> = vec![None; plane_count];
        for (index, result) in receiver.iter() {
            slots[index] = Some(result?);
        }
        // a panicking job drops its sender without a result
        slots
            .into_iter()
            .collect::<Option<Vec<Channel>>>()
            .ok_or(Error::DecompositionDidNotConverge)
    }

    fn load_channels(path: &Path) -> Result<Vec<Channel>> {
        let display = path.display().to_string();
        let store = FactorStore::read(path)?;
        let channels = match store.channel_count() {
            Some(count) => (0..count)
                .map(|index| restore_required(&store, index))
                .collect::<Result<Vec<Channel>>>()?,
            None => {
                log::warn!(
                    "'{}' does not state its channel count, reading channels until the first gap",
                    display
                );
                probe_channels(&store)?
            }
        };

        let first = channels
            .first()
            .ok_or_else(|| Error::NoChannelsInFactorFile(display.clone()))?
            .shape();
        if let Some(channel) = channels.iter().find(|channel| channel.shape() != first) {
            return Err(Error::MismatchOfPlaneShapes(first, channel.shape()));
        }
        for (index, channel) in channels.iter().enumerate() {
            log_channel(index, channel);
        }
        Ok(channels)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Largest number of singular values of any channel.
    pub fn singular_value_count(&self) -> usize {
        self.channels.iter().map(Channel::rank).max().unwrap_or(0)
    }

    /// Reconstructs the image from all singular values strictly greater than
    /// `threshold`.
    pub fn compose(&self, threshold: f64) -> Result<Raster> {
        let planes = self
            .channels
            .iter()
            .enumerate()
            .map(|(index, channel)| {
                log::debug!(
                    "Channel {} keeps {} of {} singular values above {}",
                    index,
                    channel.retained(threshold),
                    channel.rank(),
                    threshold
                );
                channel.compose(threshold)
            })
            .collect();
        Raster::from_planes(planes)
    }

    /// Reconstructs the image from the `rank` leading singular values of every
    /// channel. Zero keeps all of them.
    pub fn compose_rank(&self, rank: usize) -> Result<Raster> {
        let planes = self
            .channels
            .iter()
            .map(|channel| channel.compose_rank(rank))
            .collect::<Result<Vec<DMatrix<f64>>>>()?;
        Raster::from_planes(planes)
    }

    /// Writes the factors of every channel together with the channel count,
    /// in the format selected by the extension of `path`.
    pub fn save_channels(&self, path: &Path) -> Result<()> {
        let mut store = FactorStore::new();
        store.set_channel_count(self.channels.len());
        for (index, channel) in self.channels.iter().enumerate() {
            channel.serialize(&mut store, index);
        }
        store.write(path)
    }
}

fn restore_required(store: &FactorStore, index: usize) -> Result<Channel> {
    match Channel::restore(store, index)? {
        Some(channel) => Ok(channel),
        None => {
            let [u_key, _, _] = factor_keys(index);
            Err(Error::MissingFactor(u_key))
        }
    }
}

fn probe_channels(store: &FactorStore) -> Result<Vec<Channel>> {
    let mut channels = Vec::new();
    while let Some(channel) = Channel::restore(store, channels.len())? {
        channels.push(channel);
    }
    Ok(channels)
}

fn log_channel(index: usize, channel: &Channel) {
    let (rows, cols) = channel.shape();
    logger::log_factors(index, rows, cols, channel.singular_values().as_slice());
}
