//! Clip decoding (Symphonia)
//!
//! Only the first channel is kept: the classifier analyses a single channel.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::clip::AudioClip;
use super::error::{AudioError, AudioResult};

/// Decode an audio file into a mono clip
pub fn decode_file(path: &Path) -> AudioResult<AudioClip> {
    let file = File::open(path).map_err(|e| AudioError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let clip = decode_source(Box::new(file), hint)?;
    log::info!(
        "Decoded {:?}: {} samples @ {} Hz ({:.2}s)",
        path.file_name().unwrap_or_default(),
        clip.len(),
        clip.sample_rate(),
        clip.duration_secs()
    );
    Ok(clip)
}

/// Decode an in-memory encoded clip (e.g. a finished recording)
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> AudioResult<AudioClip> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }
    decode_source(Box::new(Cursor::new(bytes)), hint)
}

fn decode_source(source: Box<dyn MediaSource>, hint: Hint) -> AudioResult<AudioClip> {
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let mut format = probed.format;

    // Find the first audio track
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Decode("No audio track found".to_string()))?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::Decode("Unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut buf_frames = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet: {}", e);
                continue;
            }
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);

        // Packets may grow, so the buffer is rebuilt when it is too small
        if sample_buf.is_none() || decoded.capacity() > buf_frames {
            buf_frames = decoded.capacity();
            sample_buf = Some(SampleBuffer::new(buf_frames as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend(buf.samples().iter().step_by(channels));
        }
    }

    if samples.is_empty() {
        return Err(AudioError::Decode("No audio samples decoded".to_string()));
    }

    AudioClip::new(samples, sample_rate)
}
