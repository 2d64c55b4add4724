//! Instrument catalog: the XML file listing every instrument the pipelines
//! process, with per-type child elements.
//!
//! Reading goes through quick-xml events; writing is hand-formatted so the
//! output stays byte-compatible with the source format (fixed attribute
//! order and indentation). The same shapes serialize to and from JSON.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icb {
    #[serde(default)]
    pub icb1: String,
    #[serde(default)]
    pub icb2: String,
    #[serde(default)]
    pub icb3: String,
    #[serde(default)]
    pub icb4: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    #[serde(default)]
    pub cfi: String,
    #[serde(default)]
    pub compartment: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub shares: String,
    #[serde(default)]
    pub trading_mode: String,
    pub icb: Option<Icb>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub base_cap: Option<String>,
    pub base_cap_currency: Option<String>,
    #[serde(default)]
    pub base_date: String,
    #[serde(default)]
    pub base_level: String,
    #[serde(default)]
    pub calc_freq: String,
    #[serde(default)]
    pub cap_factor: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub weighting: String,
    pub icb: Option<Icb>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub isin: String,
    #[serde(default)]
    pub mep: String,
    #[serde(default)]
    pub mic: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub vendor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inav {
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub isin: String,
    #[serde(default)]
    pub mep: String,
    #[serde(default)]
    pub mic: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub target: Vec<Reference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fund {
    #[serde(default)]
    pub cfi: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub shares: String,
    #[serde(default)]
    pub trading_mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Etv {
    #[serde(default)]
    pub all_in_fees: String,
    #[serde(default)]
    pub cfi: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub dividend_frequency: String,
    #[serde(default)]
    pub expense_ratio: String,
    #[serde(default)]
    pub launch_date: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub shares: String,
    #[serde(default)]
    pub trading_mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Etf {
    #[serde(default)]
    pub cfi: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub dividend_frequency: String,
    #[serde(default)]
    pub exposition_type: String,
    #[serde(default)]
    pub fraction: String,
    #[serde(default)]
    pub index_family: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub launch_date: String,
    #[serde(default)]
    pub mer: String,
    #[serde(default)]
    pub ter: String,
    #[serde(default)]
    pub trading_mode: String,
    #[serde(default)]
    pub shares: String,
    #[serde(default)]
    pub inav: Inav,
    #[serde(default)]
    pub underlying: Reference,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogInstrument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub found_in_search: String,
    #[serde(default)]
    pub isin: String,
    #[serde(default)]
    pub mep: String,
    #[serde(default)]
    pub mic: String,
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub symbol: String,
    #[serde(rename = "tradingmode", skip_serializing_if = "Option::is_none")]
    pub tradingmode: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etf: Option<Etf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etv: Option<Etv>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fund: Option<Fund>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inav: Option<Inav>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<Index>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<Stock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "instrument", default)]
    pub instruments: Vec<CatalogInstrument>,
}

pub fn read_xml_file(path: &Path) -> Result<Catalog> {
    let xml = std::fs::read_to_string(path).map_err(|e| {
        AppError::Io(format!("cannot open xml file '{}': {}", path.display(), e))
    })?;

    parse_xml(&xml)
        .map_err(|e| AppError::Parse(format!("cannot parse xml file '{}': {}", path.display(), e)))
}

pub fn read_json_file(path: &Path) -> Result<Catalog> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Io(format!("cannot open json file '{}': {}", path.display(), e))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        AppError::Parse(format!("cannot parse json file '{}': {}", path.display(), e))
    })
}

pub fn write_xml_file(path: &Path, catalog: &Catalog) -> Result<()> {
    std::fs::write(path, to_xml_string(catalog)).map_err(|e| {
        AppError::Io(format!("cannot write xml file '{}': {}", path.display(), e))
    })
}

pub fn write_json_file(path: &Path, catalog: &Catalog) -> Result<()> {
    let json = serde_json::to_string_pretty(catalog)?;
    std::fs::write(path, json).map_err(|e| {
        AppError::Io(format!("cannot write json file '{}': {}", path.display(), e))
    })
}

// ---------------------------------------------------------------------------
// XML reading
// ---------------------------------------------------------------------------

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|err| AppError::Parse(format!("bad attribute: {}", err)))?;
        if a.key.as_ref() == name.as_bytes() {
            let value = a
                .unescape_value()
                .map_err(|err| AppError::Parse(format!("bad attribute value: {}", err)))?;
            return Ok(Some(value.into_owned()));
        }
    }

    Ok(None)
}

fn attr_or_default(e: &BytesStart<'_>, name: &str) -> Result<String> {
    Ok(attr(e, name)?.unwrap_or_default())
}

fn parse_icb(e: &BytesStart<'_>) -> Result<Icb> {
    Ok(Icb {
        icb1: attr_or_default(e, "icb1")?,
        icb2: attr_or_default(e, "icb2")?,
        icb3: attr_or_default(e, "icb3")?,
        icb4: attr_or_default(e, "icb4")?,
    })
}

fn parse_reference(e: &BytesStart<'_>) -> Result<Reference> {
    Ok(Reference {
        isin: attr_or_default(e, "isin")?,
        mep: attr_or_default(e, "mep")?,
        mic: attr_or_default(e, "mic")?,
        name: attr_or_default(e, "name")?,
        symbol: attr_or_default(e, "symbol")?,
        vendor: attr_or_default(e, "vendor")?,
    })
}

fn parse_inav(e: &BytesStart<'_>) -> Result<Inav> {
    Ok(Inav {
        currency: attr_or_default(e, "currency")?,
        isin: attr_or_default(e, "isin")?,
        mep: attr_or_default(e, "mep")?,
        mic: attr_or_default(e, "mic")?,
        name: attr_or_default(e, "name")?,
        symbol: attr_or_default(e, "symbol")?,
        vendor: attr_or_default(e, "vendor")?,
        target: Vec::new(),
    })
}

fn parse_stock(e: &BytesStart<'_>) -> Result<Stock> {
    Ok(Stock {
        cfi: attr_or_default(e, "cfi")?,
        compartment: attr_or_default(e, "compartment")?,
        currency: attr_or_default(e, "currency")?,
        shares: attr_or_default(e, "shares")?,
        trading_mode: attr_or_default(e, "tradingMode")?,
        icb: None,
    })
}

fn parse_index(e: &BytesStart<'_>) -> Result<Index> {
    Ok(Index {
        base_cap: attr(e, "baseCap")?,
        base_cap_currency: attr(e, "baseCapCurrency")?,
        base_date: attr_or_default(e, "baseDate")?,
        base_level: attr_or_default(e, "baseLevel")?,
        calc_freq: attr_or_default(e, "calcFreq")?,
        cap_factor: attr_or_default(e, "capFactor")?,
        currency: attr_or_default(e, "currency")?,
        family: attr_or_default(e, "family")?,
        kind: attr_or_default(e, "kind")?,
        weighting: attr_or_default(e, "weighting")?,
        icb: None,
    })
}

fn parse_fund(e: &BytesStart<'_>) -> Result<Fund> {
    Ok(Fund {
        cfi: attr_or_default(e, "cfi")?,
        currency: attr_or_default(e, "currency")?,
        issuer: attr_or_default(e, "issuer")?,
        shares: attr_or_default(e, "shares")?,
        trading_mode: attr_or_default(e, "tradingMode")?,
    })
}

fn parse_etv(e: &BytesStart<'_>) -> Result<Etv> {
    Ok(Etv {
        all_in_fees: attr_or_default(e, "allInFees")?,
        cfi: attr_or_default(e, "cfi")?,
        currency: attr_or_default(e, "currency")?,
        dividend_frequency: attr_or_default(e, "dividendFrequency")?,
        expense_ratio: attr_or_default(e, "expenseRatio")?,
        launch_date: attr_or_default(e, "launchDate")?,
        issuer: attr_or_default(e, "issuer")?,
        shares: attr_or_default(e, "shares")?,
        trading_mode: attr_or_default(e, "tradingMode")?,
    })
}

fn parse_etf(e: &BytesStart<'_>) -> Result<Etf> {
    Ok(Etf {
        cfi: attr_or_default(e, "cfi")?,
        currency: attr_or_default(e, "currency")?,
        dividend_frequency: attr_or_default(e, "dividendFrequency")?,
        exposition_type: attr_or_default(e, "expositionType")?,
        fraction: attr_or_default(e, "fraction")?,
        index_family: attr_or_default(e, "indexFamily")?,
        issuer: attr_or_default(e, "issuer")?,
        launch_date: attr_or_default(e, "launchDate")?,
        mer: attr_or_default(e, "mer")?,
        ter: attr_or_default(e, "ter")?,
        trading_mode: attr_or_default(e, "tradingMode")?,
        shares: attr_or_default(e, "shares")?,
        inav: Inav::default(),
        underlying: Reference::default(),
    })
}

fn parse_instrument(e: &BytesStart<'_>) -> Result<CatalogInstrument> {
    Ok(CatalogInstrument {
        cfi: attr(e, "cfi")?,
        description: attr(e, "description")?,
        file: attr_or_default(e, "file")?,
        found_in_search: attr_or_default(e, "foundInSearch")?,
        isin: attr_or_default(e, "isin")?,
        mep: attr_or_default(e, "mep")?,
        mic: attr_or_default(e, "mic")?,
        name: attr_or_default(e, "name")?,
        notes: attr(e, "notes")?,
        symbol: attr_or_default(e, "symbol")?,
        tradingmode: attr(e, "tradingmode")?,
        kind: attr_or_default(e, "type")?,
        vendor: attr(e, "vendor")?,
        etf: None,
        etv: None,
        fund: None,
        inav: None,
        index: None,
        stock: None,
    })
}

pub fn parse_xml(xml: &str) -> Result<Catalog> {
    let mut reader = Reader::from_str(xml);
    let mut catalog = Catalog::default();
    let mut current: Option<CatalogInstrument> = None;
    // Open elements below <instrument>, to route icb/inav/target/underlying.
    let mut path: Vec<String> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| AppError::Parse(format!("xml error: {}", e)))?;

        let empty = matches!(&event, Event::Empty(_));
        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

                match name.as_str() {
                    "instrument" => {
                        let instrument = parse_instrument(e)?;
                        if empty {
                            catalog.instruments.push(instrument);
                        } else {
                            current = Some(instrument);
                        }
                    }
                    "stock" | "index" | "etf" | "etv" | "fund" => {
                        if let Some(ins) = current.as_mut() {
                            match name.as_str() {
                                "stock" => ins.stock = Some(parse_stock(e)?),
                                "index" => ins.index = Some(parse_index(e)?),
                                "etf" => ins.etf = Some(parse_etf(e)?),
                                "etv" => ins.etv = Some(parse_etv(e)?),
                                _ => ins.fund = Some(parse_fund(e)?),
                            }
                        }
                    }
                    "icb" => {
                        if let Some(ins) = current.as_mut() {
                            let icb = Some(parse_icb(e)?);
                            match path.last().map(String::as_str) {
                                Some("stock") => {
                                    if let Some(stock) = ins.stock.as_mut() {
                                        stock.icb = icb;
                                    }
                                }
                                Some("index") => {
                                    if let Some(index) = ins.index.as_mut() {
                                        index.icb = icb;
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    "inav" => {
                        if let Some(ins) = current.as_mut() {
                            let inav = parse_inav(e)?;
                            if path.last().map(String::as_str) == Some("etf") {
                                if let Some(etf) = ins.etf.as_mut() {
                                    etf.inav = inav;
                                }
                            } else {
                                ins.inav = Some(inav);
                            }
                        }
                    }
                    "target" => {
                        if let Some(ins) = current.as_mut() {
                            let target = parse_reference(e)?;
                            if path.iter().any(|p| p == "etf") {
                                if let Some(etf) = ins.etf.as_mut() {
                                    etf.inav.target.push(target);
                                }
                            } else if let Some(inav) = ins.inav.as_mut() {
                                inav.target.push(target);
                            }
                        }
                    }
                    "underlying" => {
                        if let Some(ins) = current.as_mut() {
                            if let Some(etf) = ins.etf.as_mut() {
                                etf.underlying = parse_reference(e)?;
                            }
                        }
                    }
                    _ => {}
                }

                if !empty && name != "instrument" && current.is_some() {
                    path.push(name);
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "instrument" {
                    if let Some(ins) = current.take() {
                        catalog.instruments.push(ins);
                    }
                    path.clear();
                } else if path.last() == Some(&name) {
                    path.pop();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(catalog)
}

// ---------------------------------------------------------------------------
// XML writing, byte-compatible with the source format
// ---------------------------------------------------------------------------

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn write_open_tag(out: &mut String, ins: &CatalogInstrument) {
    let description = xml_escape(ins.description.as_deref().unwrap_or_default());
    let vendor = xml_escape(ins.vendor.as_deref().unwrap_or_default());

    if ins.found_in_search.is_empty() {
        let _ = write!(
            out,
            "  <instrument mic=\"{}\" isin=\"{}\" symbol=\"{}\" name=\"{}\" type=\"{}\" file=\"{}\" description=\"{}\" mep=\"{}\" vendor=\"{}\">\n",
            ins.mic, ins.isin, ins.symbol, xml_escape(&ins.name), ins.kind, ins.file, description, ins.mep, vendor
        );
    } else {
        let _ = write!(
            out,
            "  <instrument foundInSearch=\"{}\" mic=\"{}\" isin=\"{}\" symbol=\"{}\" name=\"{}\" type=\"{}\" file=\"{}\" description=\"{}\" mep=\"{}\" vendor=\"{}\">\n",
            ins.found_in_search, ins.mic, ins.isin, ins.symbol, xml_escape(&ins.name), ins.kind, ins.file, description, ins.mep, vendor
        );
    }
}

const CLOSING_TAG: &str = "  </instrument>\n";

fn write_icb(out: &mut String, icb: &Icb, indent: &str) {
    let _ = write!(
        out,
        "{}<icb icb1=\"{}\" icb2=\"{}\" icb3=\"{}\" icb4=\"{}\" />\n",
        indent, icb.icb1, icb.icb2, icb.icb3, icb.icb4
    );
}

fn write_inav(out: &mut String, inav: &Inav, indent: &str) {
    if inav.target.is_empty() {
        let _ = write!(
            out,
            "{}<inav vendor=\"{}\" mep=\"{}\" mic=\"{}\" isin=\"{}\" symbol=\"{}\" name=\"{}\" currency=\"{}\" />\n",
            indent, inav.vendor, inav.mep, inav.mic, inav.isin, inav.symbol,
            xml_escape(&inav.name), inav.currency
        );
    } else {
        let _ = write!(
            out,
            "{}<inav vendor=\"{}\" mep=\"{}\" mic=\"{}\" isin=\"{}\" symbol=\"{}\" name=\"{}\" currency=\"{}\">\n",
            indent, inav.vendor, inav.mep, inav.mic, inav.isin, inav.symbol,
            xml_escape(&inav.name), inav.currency
        );
        for target in &inav.target {
            let _ = write!(
                out,
                "{}  <target vendor=\"{}\" mep=\"{}\" mic=\"{}\" isin=\"{}\" symbol=\"{}\" name=\"{}\" />\n",
                indent, target.vendor, target.mep, target.mic, target.isin, target.symbol,
                xml_escape(&target.name)
            );
        }
        let _ = write!(out, "{}</inav>\n", indent);
    }
}

fn instrument_to_xml(ins: &CatalogInstrument) -> String {
    let mut s = String::new();
    write_open_tag(&mut s, ins);

    if let Some(stock) = &ins.stock {
        let _ = write!(
            s,
            "    <stock cfi=\"{}\" compartment=\"{}\" tradingMode=\"{}\" currency=\"{}\" shares=\"{}\">\n",
            stock.cfi, stock.compartment, stock.trading_mode, stock.currency, stock.shares
        );
        if let Some(icb) = &stock.icb {
            write_icb(&mut s, icb, "      ");
        }
        s.push_str("    </stock>\n");
    }

    if let Some(index) = &ins.index {
        let mut opt = String::new();
        if let Some(base_cap) = &index.base_cap {
            let _ = write!(opt, " baseCap=\"{}\"", base_cap);
        }
        if let Some(currency) = &index.base_cap_currency {
            let _ = write!(opt, " baseCapCurrency=\"{}\"", currency);
        }
        let attrs = format!(
            "kind=\"{}\" family=\"{}\" calcFreq=\"{}\" baseDate=\"{}\" baseLevel=\"{}\" weighting=\"{}\" capFactor=\"{}\" currency=\"{}\"{}",
            index.kind, xml_escape(&index.family), index.calc_freq, index.base_date,
            index.base_level, index.weighting, index.cap_factor, index.currency, opt
        );
        if let Some(icb) = &index.icb {
            let _ = write!(s, "    <index {}>\n", attrs);
            write_icb(&mut s, icb, "      ");
            s.push_str("    </index>\n");
        } else {
            let _ = write!(s, "    <index {} />\n", attrs);
        }
    }

    if let Some(etv) = &ins.etv {
        let _ = write!(
            s,
            "    <etv cfi=\"{}\" tradingMode=\"{}\" allInFees=\"{}\" expenseRatio=\"{}\" dividendFrequency=\"{}\" currency=\"{}\" issuer=\"{}\" shares=\"{}\" />\n",
            etv.cfi, etv.trading_mode, etv.all_in_fees, etv.expense_ratio,
            etv.dividend_frequency, etv.currency, xml_escape(&etv.issuer), etv.shares
        );
    }

    if let Some(etf) = &ins.etf {
        let _ = write!(
            s,
            "    <etf cfi=\"{}\" tradingMode=\"{}\" ter=\"{}\" launchDate=\"{}\" issuer=\"{}\" fraction=\"{}\" dividendFrequency=\"{}\" indexFamily=\"{}\" expositionType=\"{}\" currency=\"{}\">\n",
            etf.cfi, etf.trading_mode, etf.ter, etf.launch_date, xml_escape(&etf.issuer),
            etf.fraction, etf.dividend_frequency, xml_escape(&etf.index_family),
            etf.exposition_type, etf.currency
        );
        write_inav(&mut s, &etf.inav, "      ");
        let underlying = &etf.underlying;
        let _ = write!(
            s,
            "      <underlying vendor=\"{}\" mep=\"{}\" mic=\"{}\" isin=\"{}\" symbol=\"{}\" name=\"{}\" />\n",
            underlying.vendor, underlying.mep, underlying.mic, underlying.isin,
            underlying.symbol, xml_escape(&underlying.name)
        );
        s.push_str("    </etf>\n");
    }

    if let Some(inav) = &ins.inav {
        write_inav(&mut s, inav, "    ");
    }

    if let Some(fund) = &ins.fund {
        let _ = write!(
            s,
            "    <fund cfi=\"{}\" tradingMode=\"{}\" currency=\"{}\" issuer=\"{}\" shares=\"{}\" />\n",
            fund.cfi, fund.trading_mode, fund.currency, xml_escape(&fund.issuer), fund.shares
        );
    }

    s.push_str(CLOSING_TAG);
    s
}

pub fn to_xml_string(catalog: &Catalog) -> String {
    let mut out = String::from("<instruments>\n");
    for instrument in &catalog.instruments {
        out.push_str(&instrument_to_xml(instrument));
    }
    out.push_str("</instruments>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const STOCK_XML: &str = "<instruments>\n  \
<instrument foundInSearch=\"true\" mic=\"XPAR\" isin=\"FR0013426004\" symbol=\"CLA\" name=\"CLARANOVA\" type=\"stock\" file=\"xpar/stock/CLA.h5:/XPAR_CLA_FR0013426004\" description=\"\" mep=\"PAR\" vendor=\"Euronext\">\n    \
<stock cfi=\"ESVUFN\" compartment=\"B\" tradingMode=\"continuous\" currency=\"EUR\" shares=\"39,442,878\">\n      \
<icb icb1=\"9000\" icb2=\"9500\" icb3=\"9530\" icb4=\"9537\" />\n    \
</stock>\n  \
</instrument>\n\
</instruments>\n";

    #[test]
    fn test_parse_stock_instrument() {
        let catalog = parse_xml(STOCK_XML).unwrap();
        assert_eq!(catalog.instruments.len(), 1);

        let ins = &catalog.instruments[0];
        assert_eq!(ins.symbol, "CLA");
        assert_eq!(ins.kind, "stock");
        assert_eq!(ins.mic, "XPAR");
        assert_eq!(ins.vendor.as_deref(), Some("Euronext"));

        let stock = ins.stock.as_ref().unwrap();
        assert_eq!(stock.cfi, "ESVUFN");
        assert_eq!(stock.shares, "39,442,878");
        assert_eq!(stock.icb.as_ref().unwrap().icb4, "9537");
    }

    #[test]
    fn test_stock_round_trips_byte_for_byte() {
        let catalog = parse_xml(STOCK_XML).unwrap();
        assert_eq!(to_xml_string(&catalog), STOCK_XML);
    }

    #[test]
    fn test_parse_index_with_optional_caps() {
        let xml = "<instruments>\n  \
<instrument foundInSearch=\"true\" mic=\"XPAR\" isin=\"FR0003500008\" symbol=\"PX1\" name=\"CAC 40\" type=\"index\" file=\"xpar/index/PX1.h5:/XPAR_PX1_FR0003500008\" description=\"\" mep=\"PAR\" vendor=\"Euronext\">\n    \
<index kind=\"price\" family=\"CAC 40\" calcFreq=\"15s\" baseDate=\"1987-12-31\" baseLevel=\"1000\" weighting=\"float market cap\" capFactor=\"0.15\" currency=\"EUR\" baseCap=\"370437433957.70\" baseCapCurrency=\"EUR\" />\n  \
</instrument>\n\
</instruments>\n";

        let catalog = parse_xml(xml).unwrap();
        let index = catalog.instruments[0].index.as_ref().unwrap();
        assert_eq!(index.base_cap.as_deref(), Some("370437433957.70"));
        assert_eq!(index.family, "CAC 40");
        assert!(index.icb.is_none());

        assert_eq!(to_xml_string(&catalog), xml);
    }

    #[test]
    fn test_parse_etf_with_inav_and_underlying() {
        let xml = "<instruments>\n  \
<instrument foundInSearch=\"false\" mic=\"XAMS\" isin=\"IE00BYPC1H27\" symbol=\"CNYB\" name=\"IS CHN BND USD ACC\" type=\"etf\" file=\"xams/etf/CNYB.h5:/XAMS_CNYB_IE00BYPC1H27\" description=\"\" mep=\"AMS\" vendor=\"Euronext\">\n    \
<etf cfi=\"CEOMS\" tradingMode=\"continuous\" ter=\"0.35%\" launchDate=\"29/07/2019\" issuer=\"iShares IV plc.\" fraction=\"\" dividendFrequency=\"distribution\" indexFamily=\"\" expositionType=\"physical\" currency=\"USD\">\n      \
<inav vendor=\"Euronext\" mep=\"\" mic=\"\" isin=\"NSCFR0ICNYB4\" symbol=\"ICNYB\" name=\"ISHARES CNYB INAV\" currency=\"\" />\n      \
<underlying vendor=\"Euronext\" mep=\"\" mic=\"\" isin=\"\" symbol=\"\" name=\"BBG Barclays CH Treasury + PBI\" />\n    \
</etf>\n  \
</instrument>\n\
</instruments>\n";

        let catalog = parse_xml(xml).unwrap();
        let etf = catalog.instruments[0].etf.as_ref().unwrap();
        assert_eq!(etf.inav.symbol, "ICNYB");
        assert_eq!(etf.underlying.name, "BBG Barclays CH Treasury + PBI");

        assert_eq!(to_xml_string(&catalog), xml);
    }

    #[test]
    fn test_escaped_attributes_survive_round_trip() {
        let mut catalog = Catalog::default();
        catalog.instruments.push(CatalogInstrument {
            name: "M&M \"QUOTED\"".to_string(),
            kind: "stock".to_string(),
            stock: Some(Stock::default()),
            ..Default::default()
        });

        let xml = to_xml_string(&catalog);
        assert!(xml.contains("M&amp;M &quot;QUOTED&quot;"));

        let reparsed = parse_xml(&xml).unwrap();
        assert_eq!(reparsed.instruments[0].name, "M&M \"QUOTED\"");
    }

    #[test]
    fn test_json_round_trip() {
        let catalog = parse_xml(STOCK_XML).unwrap();
        let json = serde_json::to_string_pretty(&catalog).unwrap();
        assert!(json.contains("\"type\": \"stock\""));
        let reparsed: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, catalog);
    }
}
