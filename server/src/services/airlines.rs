//! Airline code conversion between IATA (2-letter) and ICAO (3-letter)
//! callsign prefixes.
//!
//! The table is a curated subset covering the majors; the inverse map is
//! derived once on first use.

use std::collections::HashMap;
use std::sync::OnceLock;

/// IATA (2-letter) to ICAO (3-letter) airline designators.
static IATA_TO_ICAO: &[(&str, &str)] = &[
    ("AA", "AAL"), // American Airlines
    ("DL", "DAL"), // Delta Air Lines
    ("UA", "UAL"), // United Airlines
    ("AS", "ASA"), // Alaska Airlines
    ("B6", "JBU"), // JetBlue Airways
    ("NK", "NKS"), // Spirit Airlines
    ("F9", "FFT"), // Frontier Airlines
    ("G4", "AAY"), // Allegiant Air
    ("WS", "WJA"), // WestJet
    ("AC", "ACA"), // Air Canada
    ("AF", "AFR"), // Air France
    ("KL", "KLM"), // KLM Royal Dutch Airlines
    ("BA", "BAW"), // British Airways
    ("LH", "DLH"), // Lufthansa
    ("LX", "SWR"), // SWISS
    ("OS", "AUA"), // Austrian Airlines
    ("SN", "BEL"), // Brussels Airlines
    ("IB", "IBE"), // Iberia
    ("VY", "VLG"), // Vueling
    ("TP", "TAP"), // TAP Air Portugal
    ("AZ", "ITY"), // ITA Airways
    ("FR", "RYR"), // Ryanair
    ("U2", "EZY"), // easyJet UK
    ("W6", "WZZ"), // Wizz Air
    ("TK", "THY"), // Turkish Airlines
    ("EK", "UAE"), // Emirates
    ("QR", "QTR"), // Qatar Airways
    ("EY", "ETD"), // Etihad Airways
    ("FZ", "FDB"), // flydubai
    ("SU", "AFL"), // Aeroflot Russian Airlines
    ("S7", "SBI"), // S7 Airlines
    ("U6", "SVR"), // Ural Airlines
    ("UT", "UTA"), // UTair
    ("LO", "LOT"), // LOT Polish Airlines
    ("SK", "SAS"), // Scandinavian Airlines
    ("AY", "FIN"), // Finnair
    ("DY", "NOZ"), // Norwegian Air Shuttle
    ("BT", "BTI"), // airBaltic
    ("A3", "AEE"), // Aegean Airlines
    ("CA", "CCA"), // Air China
    ("MU", "CES"), // China Eastern
    ("CZ", "CSN"), // China Southern
    ("NH", "ANA"), // All Nippon Airways
    ("JL", "JAL"), // Japan Airlines
    ("QF", "QFA"), // Qantas
    ("NZ", "ANZ"), // Air New Zealand
    ("KE", "KAL"), // Korean Air
    ("OZ", "AAR"), // Asiana Airlines
    ("ET", "ETH"), // Ethiopian Airlines
    ("KQ", "KQA"), // Kenya Airways
    ("MS", "MSR"), // Egyptair
    ("SV", "SVA"), // Saudia
    ("SA", "SAA"), // South African Airways
];

fn iata_map() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| IATA_TO_ICAO.iter().copied().collect())
}

fn icao_map() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| IATA_TO_ICAO.iter().map(|&(iata, icao)| (icao, iata)).collect())
}

/// ICAO designator for a 2-letter IATA airline prefix, if known.
#[must_use]
pub fn icao_for_iata_prefix(iata: &str) -> Option<&'static str> {
    let iata = iata.trim().to_uppercase();
    if iata.len() != 2 {
        return None;
    }
    iata_map().get(iata.as_str()).copied()
}

/// IATA designator for a 3-letter ICAO airline prefix, if known.
#[must_use]
pub fn iata_for_icao_prefix(icao: &str) -> Option<&'static str> {
    let icao = icao.trim().to_uppercase();
    if icao.len() != 3 {
        return None;
    }
    icao_map().get(icao.as_str()).copied()
}

/// Alternate form of a callsign with the airline prefix converted between
/// IATA and ICAO. Returns `None` when the leading alphabetic prefix is not a
/// known 2- or 3-letter designator.
///
/// The input is normalized (trimmed, uppercased) before conversion.
#[must_use]
pub fn alternate_callsign(callsign: &str) -> Option<String> {
    let cs = callsign.trim().to_uppercase();
    if cs.is_empty() {
        return None;
    }
    let split = cs.find(|c: char| !c.is_ascii_uppercase()).unwrap_or(cs.len());
    if split == 0 {
        return None;
    }
    let (prefix, suffix) = cs.split_at(split);
    let converted = match prefix.len() {
        2 => iata_map().get(prefix).copied(),
        3 => icao_map().get(prefix).copied(),
        _ => None,
    }?;
    Some(format!("{converted}{suffix}"))
}
