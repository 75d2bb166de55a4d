// src/specs/isx.rs
//! ISX company profile page: performance history table (`#dispTable`).
//!
//! Column order on the site (0-based `td` index):
//! 0 trades, 1 volume, 2 total shares, 5 low, 6 high, 7 open, 8 close, 9 date.

pub const PORTAL: &str = "http://www.isx-iq.net/isxportal/portal/";

/// Navigation target used to prove a fresh session is alive.
pub const BLANK_URL: &str = "about:blank";

pub const BODY_SELECTOR: &str = "body";
pub const TABLE_SELECTOR: &str = "#dispTable tbody tr";

/// Rows per full page of the history table.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Pager parameter name generated by the site's display-tag table.
const PAGER_PARAM: &str = "d-6716032-p=";

pub const EXTRACT_ROWS_SCRIPT: &str = r#"
(() => {
    const table = document.getElementById('dispTable');
    if (!table) return [];
    const rows = table.querySelectorAll('tbody tr');
    return Array.from(rows).map(row => {
        const cells = row.querySelectorAll('td');
        const text = i => (cells[i] ? cells[i].textContent.trim() : '');
        return {
            Date: text(9),
            OpenPrice: text(7),
            HighPrice: text(6),
            LowPrice: text(5),
            ClosePrice: text(8),
            Volume: text(1),
            TotalShares: text(2),
            NumTrades: text(0)
        };
    });
})()
"#;

/// Date of the first row currently shown, or `null`.
pub const FIRST_ROW_PROBE: &str = r#"
(() => {
    const cell = document.querySelector('#dispTable tbody tr td:nth-child(10)');
    return cell ? cell.textContent.trim() : null;
})()
"#;

pub fn company_url(ticker: &str) -> String {
    format!("{PORTAL}companyprofilecontainer.html?currLanguage=en&companyCode={ticker}%20&activeTab=0")
}

/// Fill the from-date and press the search button.
pub fn search_script(from_date: &str) -> String {
    format!(
        r##"
(() => {{
    const dateInput = document.querySelector("#fromDate");
    dateInput.value = "{from_date}";
    dateInput.dispatchEvent(new Event('change', {{ bubbles: true }}));
    const searchButton = document.querySelector("#command > div.filterbox > div.button-all > input[type=button]");
    searchButton.click();
    return true;
}})()
"##
    )
}

/// Ask the site's AJAX pager for `page` of `ticker`'s history.
pub fn goto_page_script(page: u32, ticker: &str, from_date: &str, to_date: &str) -> String {
    format!(
        r#"
(() => {{
    doAjax('companyperformancehistoryfilter.html',
        'fromDate={from_date}&{PAGER_PARAM}{page}&toDate={to_date}&companyCode={ticker}',
        'ajxDspId');
    return true;
}})()
"#
    )
}

/// What a script asks the page to do. Lets non-browser sessions answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptKind {
    Search { from_date: String },
    ExtractRows,
    FirstRowProbe,
    GotoPage(u32),
    Other,
}

pub fn classify(script: &str) -> ScriptKind {
    if script == EXTRACT_ROWS_SCRIPT {
        return ScriptKind::ExtractRows;
    }
    if script == FIRST_ROW_PROBE {
        return ScriptKind::FirstRowProbe;
    }
    if let Some(page) = param_digits(script, PAGER_PARAM) {
        return ScriptKind::GotoPage(page);
    }
    if script.contains("#fromDate") {
        let from_date = script
            .split("dateInput.value = \"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .map(str::to_string)
            .unwrap_or_default();
        return ScriptKind::Search { from_date };
    }
    ScriptKind::Other
}

/// Ticker from a company profile URL (`companyCode=BMFI%20`).
pub fn ticker_from_url(url: &str) -> Option<String> {
    let start = url.find("companyCode=")? + "companyCode=".len();
    let rest = &url[start..];
    let end = rest.find(['%', '&']).unwrap_or(rest.len());
    let t = rest[..end].trim();
    if t.is_empty() { None } else { Some(s!(t)) }
}

fn param_digits(s: &str, key: &str) -> Option<u32> {
    let i = s.find(key)? + key.len();
    let digits: String = s[i..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_round_trips_ticker() {
        let url = company_url("BMFI");
        assert!(url.contains("companyCode=BMFI%20"));
        assert_eq!(ticker_from_url(&url).as_deref(), Some("BMFI"));
        assert_eq!(ticker_from_url(BLANK_URL), None);
    }

    #[test]
    fn scripts_classify_by_intent() {
        assert_eq!(classify(EXTRACT_ROWS_SCRIPT), ScriptKind::ExtractRows);
        assert_eq!(classify(FIRST_ROW_PROBE), ScriptKind::FirstRowProbe);
        assert_eq!(
            classify(&goto_page_script(7, "TASC", "01/01/2020", "16/10/2026")),
            ScriptKind::GotoPage(7)
        );
        assert_eq!(
            classify(&search_script("01/01/2020")),
            ScriptKind::Search { from_date: s!("01/01/2020") }
        );
        assert_eq!(classify("1 + 1"), ScriptKind::Other);
    }
}
