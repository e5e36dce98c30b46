//! The per-stream session and the listener the engine reports to.

use tracing::{debug, trace, warn};

use super::bridge::ConverterBridge;
use crate::engine::{PacketDescription, ParseListener, Property, SampleConverter};
use crate::error::{DecoderError, EngineError};
use crate::format::StreamDescription;
use crate::sink::FrameSink;

/// Something that went wrong inside a notification, surfaced once the engine
/// returns.
#[derive(Debug)]
pub(crate) enum SessionFailure {
    /// No converter exists for the discovered format.
    Converter(EngineError),
    /// The converter rejected a magic cookie or a packet batch.
    Conversion(EngineError),
}

impl From<SessionFailure> for DecoderError {
    fn from(failure: SessionFailure) -> Self {
        match failure {
            SessionFailure::Converter(err) => DecoderError::UnsupportedFormat(Some(err)),
            SessionFailure::Conversion(err) => DecoderError::Unknown(Some(err)),
        }
    }
}

/// Mutable state of one open stream.
///
/// `input_format`, `output_format` and `bridge` are either all set or all
/// unset.
pub(crate) struct Session<C> {
    pub input_format: Option<StreamDescription>,
    pub output_format: Option<StreamDescription>,
    pub bridge: Option<ConverterBridge<C>>,
    pub magic_cookie: Option<Vec<u8>>,
    pub failure: Option<SessionFailure>,
}

impl<C> Default for Session<C> {
    fn default() -> Self {
        Session {
            input_format: None,
            output_format: None,
            bridge: None,
            magic_cookie: None,
            failure: None,
        }
    }
}

impl<C: SampleConverter> Session<C> {
    /// Takes the failure recorded during the last parse, if any.
    pub fn take_failure(&mut self) -> Result<(), DecoderError> {
        match self.failure.take() {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    fn record(&mut self, failure: SessionFailure) {
        warn!(?failure, "engine notification failed");
        // the first failure is the one reported
        self.failure.get_or_insert(failure);
    }

    fn format_discovered(&mut self, input: StreamDescription) {
        if self.input_format.is_some() {
            trace!("ignoring repeated data format");
            return;
        }

        let output = input.canonical();
        let bridge = C::new(&input, &output).and_then(|mut converter| {
            if let Some(cookie) = &self.magic_cookie {
                converter.set_magic_cookie(cookie)?;
            }
            ConverterBridge::new(converter, &input)
        });

        match bridge {
            Ok(bridge) => {
                debug!(
                    codec = %input.codec,
                    sample_rate = input.sample_rate,
                    channels = input.channels_per_frame,
                    path = ?bridge.path(),
                    "input format discovered"
                );
                self.input_format = Some(input);
                self.output_format = Some(output);
                self.bridge = Some(bridge);
            }
            Err(err) => self.record(SessionFailure::Converter(err)),
        }
    }

    fn cookie_received(&mut self, cookie: &[u8]) {
        trace!(len = cookie.len(), "magic cookie");
        self.magic_cookie = Some(cookie.to_vec());
        if let Some(bridge) = &mut self.bridge {
            if let Err(err) = bridge.converter_mut().set_magic_cookie(cookie) {
                self.record(SessionFailure::Conversion(err));
            }
        }
    }
}

/// Routes engine notifications into a [`Session`] and its sink.
pub(crate) struct SessionListener<'a, C, S> {
    pub session: &'a mut Session<C>,
    pub sink: &'a mut S,
}

impl<C, S> ParseListener for SessionListener<'_, C, S>
where
    C: SampleConverter,
    S: FrameSink,
{
    fn property_changed(&mut self, property: Property<'_>) {
        match property {
            Property::DataFormat(input) => self.session.format_discovered(input),
            Property::MagicCookie(cookie) => self.session.cookie_received(cookie),
            Property::DataOffset(offset) => trace!(offset, "data offset"),
            Property::ReadyToProducePackets => trace!("ready to produce packets"),
        }
    }

    fn packets(&mut self, data: &[u8], descriptions: &[PacketDescription]) {
        let Some(bridge) = &mut self.session.bridge else {
            trace!(bytes = data.len(), "dropping packets without a converter");
            return;
        };
        if let Err(err) = bridge.process(data, descriptions, &mut *self.sink) {
            self.session.record(SessionFailure::Conversion(err));
        }
    }
}
