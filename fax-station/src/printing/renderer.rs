//! Page renderer
//!
//! Turns a [`RenderJob`] into one or more passes of ESC/POS bytes. A fax
//! with a picture is two passes, text then line graphics, and only the last
//! pass feeds past the cutter.

use fax_printer::{EscPosBuilder, PixelBitmap, PrintResult, PrinterProfile, mode};
use shared::FaxEnvelope;

use crate::netinfo::InterfaceInfo;

/// Something about to be printed
#[derive(Debug, Clone, PartialEq)]
pub enum RenderJob {
    Fax(FaxEnvelope),
    Help { network: Vec<InterfaceInfo> },
    NetworkStatus { network: Vec<InterfaceInfo> },
}

impl RenderJob {
    pub fn kind(&self) -> &'static str {
        match self {
            RenderJob::Fax(_) => "fax",
            RenderJob::Help { .. } => "help",
            RenderJob::NetworkStatus { .. } => "network_status",
        }
    }
}

/// One printer block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPass {
    pub data: Vec<u8>,
    pub feed_past_cutter: bool,
}

impl RenderPass {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            feed_past_cutter: false,
        }
    }

    fn last(data: Vec<u8>) -> Self {
        Self {
            data,
            feed_past_cutter: true,
        }
    }
}

const TITLE: &str = "FAX STATION";

const HELP_INTRO: &str = "This printer receives faxes sent to it over the network and \
prints them in the order they arrive. Faxes sent while it is offline are kept by the \
server and printed as soon as it reconnects.";

const HELP_USAGE: &str = "Keep the device powered and connected to the network. \
No further action is needed to receive faxes.";

const HELP_BUTTONS: &str = "Left button: print this page.\nRight button: print the network status.";

#[derive(Debug, Clone)]
pub struct Renderer {
    profile: PrinterProfile,
    columns: usize,
}

impl Renderer {
    pub fn new(profile: PrinterProfile, columns: usize) -> Self {
        Self { profile, columns }
    }

    pub fn render(&self, job: &RenderJob) -> PrintResult<Vec<RenderPass>> {
        match job {
            RenderJob::Fax(envelope) => self.fax(envelope),
            RenderJob::Help { network } => Ok(vec![RenderPass::last(self.help(network))]),
            RenderJob::NetworkStatus { network } => {
                Ok(vec![RenderPass::last(self.network_status(network))])
            }
        }
    }

    /// Fax without its picture
    pub fn fax_text_only(&self, envelope: &FaxEnvelope) -> Vec<RenderPass> {
        vec![RenderPass::last(self.fax_text(envelope))]
    }

    fn fax(&self, envelope: &FaxEnvelope) -> PrintResult<Vec<RenderPass>> {
        let text = self.fax_text(envelope);
        if !envelope.has_picture() {
            return Ok(vec![RenderPass::last(text)]);
        }

        let bitmap = PixelBitmap::decode(&envelope.picture)?;
        let mut b = EscPosBuilder::new(self.columns);
        b.mode(mode::GRAPHICS);
        b.bitmap(&bitmap, &self.profile)?;

        Ok(vec![RenderPass::new(text), RenderPass::last(b.build())])
    }

    fn fax_text(&self, envelope: &FaxEnvelope) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.columns);

        b.mode(mode::DOUBLE_HEIGHT).text("Fax from ");
        b.mode(mode::DOUBLE_HEIGHT | mode::UNDERLINE)
            .line(&envelope.sender);

        // Sender's own offset, as confirmed
        b.normal()
            .line(&format!("({})", envelope.timestamp.format("%Y-%m-%d %H:%M")))
            .newline();

        if !envelope.message.is_empty() {
            b.line(&envelope.message);
        }
        b.build()
    }

    fn help(&self, network: &[InterfaceInfo]) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.columns);

        b.mode(mode::DOUBLE_SIZE).line(TITLE);
        b.normal().text(HELP_INTRO).newline().newline();

        section(&mut b, "How it works", HELP_USAGE);
        section(&mut b, "Buttons", HELP_BUTTONS);

        if !network.is_empty() {
            b.newline();
            for interface in network {
                b.line(&interface.to_string());
            }
            b.newline();
        }
        b.build()
    }

    fn network_status(&self, network: &[InterfaceInfo]) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.columns);

        b.mode(mode::DOUBLE_SIZE).line("NETWORK");
        b.normal().sep_single();
        if network.is_empty() {
            b.line("No network connection");
        }
        for interface in network {
            b.line(&interface.name);
            for address in &interface.addresses {
                b.line_lr("", &address.to_string());
            }
        }
        b.sep_single();
        b.build()
    }
}

fn section(b: &mut EscPosBuilder, title: &str, body: &str) {
    b.mode(mode::UNDERLINE).line(title);
    b.normal().text(body).newline().newline();
}
