use rust_decimal::Decimal;
use serde::Serializer;

/// Serialize CSV records to a writer.
pub fn write_csv<I, R, W>(records: I, writer: W) -> color_eyre::Result<()>
where
    I: IntoIterator<Item = R>,
    R: serde::Serialize,
    W: std::io::Write,
{
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records.into_iter() {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Serialize CSV records to a string.
pub fn csv_string<I, R>(records: I) -> color_eyre::Result<String>
where
    I: IntoIterator<Item = R>,
    R: serde::Serialize,
{
    let mut buffer = Vec::new();
    write_csv(records, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Crypto quantity formatting: 8 decimal places, trailing zeros trimmed.
pub fn format_quantity(qty: Decimal) -> String {
    let s = format!("{:.8}", qty);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

/// USD amount formatting: 2 decimal places, sign preserved.
pub fn format_usd(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

pub fn serialize_quantity<S: Serializer>(qty: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_quantity(*qty))
}

pub fn serialize_usd<S: Serializer>(amount: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_usd(*amount))
}
