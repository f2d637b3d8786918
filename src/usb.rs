// Based on USB 2.0 specifications
// https://www.usb.org/document-library/usb-20-specification
// especially usb_20.pdf, chapter 7.1 (signaling, NRZI and bit stuffing)

pub mod encoder;
pub mod signal;
