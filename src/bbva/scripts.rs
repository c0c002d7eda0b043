//! ページ内で実行するJavaScript
//!
//! 引数はすべて serde_json でJSONリテラルとして埋め込む。

/// JSON文字列リテラル化
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// アクセシブル名（label / aria-label / placeholder）で入力欄を探し、印を付ける
pub(crate) fn tag_field(label: &str, tag: &str) -> String {
    format!(
        r#"
        (() => {{
            const wanted = {label};
            const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
            const target = norm(wanted);
            const inputs = Array.from(document.querySelectorAll('input, textarea'));
            const match = inputs.find((el) => {{
                if (norm(el.getAttribute('aria-label')) === target) return true;
                if (norm(el.getAttribute('placeholder')) === target) return true;
                const labelledBy = el.getAttribute('aria-labelledby');
                if (labelledBy) {{
                    const ref = document.getElementById(labelledBy);
                    if (ref && norm(ref.textContent) === target) return true;
                }}
                if (el.id) {{
                    const label = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
                    if (label && norm(label.textContent) === target) return true;
                }}
                const wrapping = el.closest('label');
                return !!wrapping && norm(wrapping.textContent) === target;
            }});
            if (!match) return false;
            match.setAttribute('data-scraper-target', {tag});
            return true;
        }})()
        "#,
        label = js_str(label),
        tag = js_str(tag),
    )
}

/// 印を付けた入力欄のセレクタ
pub(crate) fn tagged_selector(tag: &str) -> String {
    format!("[data-scraper-target='{}']", tag)
}

/// アクセシブル名（aria-label / テキスト）が一致するリンク・ボタン・メニュー項目をクリック
pub(crate) fn click_by_name(name: &str) -> String {
    format!(
        r#"
        (() => {{
            const wanted = {name};
            const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
            const target = norm(wanted);
            const candidates = Array.from(document.querySelectorAll(
                'a, button, input[type="submit"], input[type="button"], [role="button"], [role="link"], [role="menuitem"], [role="tab"]'
            ));
            const visible = (el) => {{
                const rect = el.getBoundingClientRect();
                const style = window.getComputedStyle(el);
                return style.display !== 'none' && style.visibility !== 'hidden' &&
                    (rect.width > 0 || rect.height > 0);
            }};
            const accessibleName = (el) =>
                norm(el.getAttribute('aria-label') || el.value || el.textContent);
            const match = candidates.find((el) => visible(el) && accessibleName(el) === target);
            if (!match) return false;
            if (match.disabled) return false;
            match.click();
            return true;
        }})()
        "#,
        name = js_str(name),
    )
}

pub(crate) fn element_exists(selector: &str) -> String {
    format!("document.querySelector({}) !== null", js_str(selector))
}

pub(crate) fn location_contains(fragment: &str) -> String {
    format!("window.location.href.indexOf({}) >= 0", js_str(fragment))
}

/// AngularJSのスコープを深さ制限付きで探索し、明細一覧をJSON文字列で返す
///
/// 既知のプロパティ名の配列、または明細らしい要素だけからなる配列を一覧とみなす。
pub(crate) fn find_statements(marker: &str, max_depth: u32) -> String {
    format!(
        r#"
        (() => {{
            const maxDepth = {max_depth};
            const result = (obj) => JSON.stringify(obj);
            const el = document.querySelector({marker});
            if (!el) return result({{ found: false, depth: 0, error: 'page marker not found' }});
            if (typeof angular === 'undefined') {{
                return result({{ found: false, depth: 0, error: 'angular not loaded' }});
            }}
            const ng = angular.element(el);
            const root = ng.scope() || ng.isolateScope();
            if (!root) return result({{ found: false, depth: 0, error: 'no scope attached to marker' }});

            const knownKeys = ['resumenes', 'listaResumenes', 'resumenesTarjeta', 'statements'];
            const looksLikeStatement = (o) => !!o && typeof o === 'object' &&
                ('idResumen' in o || 'id' in o) && ('fechaCierre' in o || 'closingDate' in o);
            // 循環参照を避けるためプリミティブ値だけコピー
            const plain = (o) => {{
                const out = {{}};
                if (!o || typeof o !== 'object') return out;
                for (const k of Object.keys(o)) {{
                    const v = o[k];
                    if (v === null || ['string', 'number', 'boolean'].includes(typeof v)) out[k] = v;
                }}
                return out;
            }};
            const found = (list, depth, key) => result({{
                found: true,
                depth: depth,
                key: key,
                entries: list.map(plain),
            }});
            let emptyKey = null;
            let emptyDepth = 0;

            const seen = new Set();
            const queue = [[root, 0]];
            let deepest = 0;
            while (queue.length > 0) {{
                const [node, depth] = queue.shift();
                if (!node || typeof node !== 'object' || seen.has(node)) continue;
                if (node === window || node instanceof Node) continue;
                seen.add(node);
                deepest = Math.max(deepest, depth);

                if (Array.isArray(node)) {{
                    if (node.length > 0 && node.every(looksLikeStatement)) return found(node, depth, null);
                    continue;
                }}

                for (const key of knownKeys) {{
                    let value;
                    try {{ value = node[key]; }} catch (e) {{ continue; }}
                    if (!Array.isArray(value)) continue;
                    if (value.length > 0) return found(value, depth + 1, key);
                    if (emptyKey === null) {{
                        emptyKey = key;
                        emptyDepth = depth + 1;
                    }}
                }}

                if (depth >= maxDepth) continue;

                for (const key of Object.keys(node)) {{
                    if (key.startsWith('$$') || key === '$parent' || key === '$root') continue;
                    let value;
                    try {{ value = node[key]; }} catch (e) {{ continue; }}
                    if (value && typeof value === 'object') queue.push([value, depth + 1]);
                }}
                let child = node.$$childHead;
                while (child) {{
                    queue.push([child, depth + 1]);
                    child = child.$$nextSibling;
                }}
            }}
            if (emptyKey !== null) {{
                return result({{
                    found: false,
                    empty: true,
                    depth: emptyDepth,
                    key: emptyKey,
                    error: "statements collection '" + emptyKey + "' is empty",
                }});
            }}
            return result({{ found: false, depth: deepest, error: 'statements collection not found' }});
        }})()
        "#,
        marker = js_str(marker),
        max_depth = max_depth,
    )
}

/// アプリの `$http`（無ければ fetch）で明細PDFを取得し、base64で返す
pub(crate) fn fetch_statement_pdf(endpoint: &str, statement_id: &str, timeout_ms: u64) -> String {
    format!(
        r#"
        new Promise((resolve) => {{
            const done = (obj) => {{
                clearTimeout(timer);
                resolve(JSON.stringify(obj));
            }};
            const timer = setTimeout(() => {{
                resolve(JSON.stringify({{ ok: false, status: 0, error: 'timeout after {timeout_ms}ms' }}));
            }}, {timeout_ms});

            const url = {endpoint};
            const body = {{ idResumen: {id} }};
            const toBase64 = (buffer) => new Promise((res, rej) => {{
                const reader = new FileReader();
                reader.onload = () => {{
                    const dataUrl = String(reader.result);
                    res(dataUrl.substring(dataUrl.indexOf(',') + 1));
                }};
                reader.onerror = () => rej(reader.error);
                reader.readAsDataURL(new Blob([buffer], {{ type: 'application/pdf' }}));
            }});
            const finish = (buffer, status) => toBase64(buffer).then(
                (b64) => done({{ ok: true, status: status, base64: b64 }}),
                (e) => done({{ ok: false, status: status, error: String(e) }})
            );

            let injector = null;
            try {{
                const app = document.querySelector('[ng-app], [data-ng-app]') || document.body;
                injector = angular.element(app).injector();
            }} catch (e) {{
                injector = null;
            }}

            if (injector) {{
                injector.get('$http').post(url, body, {{ responseType: 'arraybuffer' }}).then(
                    (resp) => finish(resp.data, resp.status),
                    (resp) => done({{
                        ok: false,
                        status: (resp && resp.status) || 0,
                        error: 'HTTP ' + ((resp && resp.status) || 'error'),
                    }})
                );
            }} else {{
                fetch(url, {{
                    method: 'POST',
                    credentials: 'include',
                    headers: {{ 'Content-Type': 'application/json' }},
                    body: JSON.stringify(body),
                }})
                    .then((r) => r.ok
                        ? r.arrayBuffer().then((b) => finish(b, r.status))
                        : done({{ ok: false, status: r.status, error: 'HTTP ' + r.status }}))
                    .catch((e) => done({{ ok: false, status: 0, error: String(e) }}));
            }}
        }})
        "#,
        endpoint = js_str(endpoint),
        id = js_str(statement_id),
        timeout_ms = timeout_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_embedded_as_json_literals() {
        let script = tag_field("Clave", "pass'word\"");
        assert!(script.contains(r#"const wanted = "Clave";"#));
        assert!(script.contains(r#"setAttribute('data-scraper-target', "pass'word\"")"#));
    }

    #[test]
    fn test_fetch_script_escapes_statement_id() {
        let script = fetch_statement_pdf("/api/pdf", "1\"); alert(1); (\"", 30_000);
        assert!(script.contains(r#"idResumen: "1\"); alert(1); (\"""#));
        assert!(script.contains("const url = \"/api/pdf\";"));
        assert!(script.contains("}, 30000);"));
    }

    #[test]
    fn test_find_statements_returns_entries_unfiltered() {
        let script = find_statements("#m", 6);
        // 判定は Rust 側 (StateSearch::into_statements) で行う
        assert!(script.contains("entries: list.map(plain)"));
        assert!(!script.contains("filter(looksLikeStatement)"));
        assert!(script.contains("empty: true"));
    }

    #[test]
    fn test_find_statements_depth_limit() {
        let script = find_statements("[ng-controller]", 6);
        assert!(script.contains("const maxDepth = 6;"));
        assert!(script.contains(r#"document.querySelector("[ng-controller]")"#));
    }

    #[test]
    fn test_small_checks() {
        assert_eq!(
            element_exists("#resumenes"),
            r##"document.querySelector("#resumenes") !== null"##
        );
        assert_eq!(
            location_contains("#!/inicio"),
            r##"window.location.href.indexOf("#!/inicio") >= 0"##
        );
        assert_eq!(tagged_selector("dni"), "[data-scraper-target='dni']");
    }
}
