use qrcode::{render::unicode, QrCode};

/// Terminal rendering of `data` as a QR code.
fn qr_code(data: &str) -> Result<String, qrcode::types::QrError> {
    let code = QrCode::new(data.as_bytes())?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Prints the code to scan, followed by the raw payload for copy/paste.
pub fn display_code(code: &str, title: &str) {
    println!("\n========================================");
    println!("Beam - {}", title);
    println!("========================================\n");

    match qr_code(code) {
        Ok(qr) => println!("{}\n", qr),
        Err(e) => {
            eprintln!("Warning: Could not generate QR code: {}", e);
            println!("Pass the code below to the receiver instead:\n");
        }
    }

    println!("Code: {}", code);
    println!();
}
