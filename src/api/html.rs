//! Static page served at `/`

/// Single-page form that posts to `/interpret`
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>梦境解析 AI 助手</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; max-width: 800px; margin: 40px auto; padding: 0 16px; background: #f5f5f5; }
        h1 { text-align: center; color: #333; }
        .card { background: #fff; border-radius: 8px; padding: 24px; box-shadow: 0 2px 8px rgba(0,0,0,0.08); }
        textarea { width: 100%; min-height: 120px; padding: 12px; border-radius: 6px; border: 1px solid #ccc; resize: vertical; font-size: 14px; box-sizing: border-box; }
        button { margin-top: 12px; padding: 10px 18px; border-radius: 6px; border: none; background: #4f46e5; color: #fff; font-size: 14px; cursor: pointer; }
        button:disabled { background: #a5b4fc; cursor: not-allowed; }
        #status { margin-top: 8px; font-size: 13px; color: #666; }
        #result { margin-top: 16px; padding: 16px; background: #111827; color: #e5e7eb; border-radius: 8px; white-space: pre-wrap; font-size: 14px; }
        #result:empty { display: none; }
    </style>
</head>
<body>
    <h1>梦境解析 AI 助手</h1>
    <div class="card">
        <p>在下面输入你的梦境描述，点击“开始解析”即可查看解析结果。</p>
        <textarea id="dream-input" placeholder="例如：昨晚我梦见自己在飞，但怎么也飞不高……"></textarea>
        <button id="submit-btn">开始解析</button>
        <div id="status"></div>
        <div id="result"></div>
    </div>
    <script>
        const button = document.getElementById('submit-btn');
        button.addEventListener('click', async () => {
            const text = document.getElementById('dream-input').value.trim();
            const statusEl = document.getElementById('status');
            const resultEl = document.getElementById('result');
            if (!text) {
                alert('请先输入你的梦境内容');
                return;
            }

            button.disabled = true;
            statusEl.textContent = '正在解析中，这可能需要一段时间，请稍候…';
            resultEl.textContent = '';

            try {
                const response = await fetch('/interpret', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ text })
                });
                const data = await response.json();
                if (response.ok && data.interpretation !== undefined) {
                    statusEl.textContent = data.source === 'fallback' ? '解析完成（关键词模式）' : '解析完成';
                    resultEl.textContent = data.interpretation;
                } else {
                    statusEl.textContent = '解析失败';
                    resultEl.textContent = data.error || '未知错误';
                }
            } catch (e) {
                statusEl.textContent = '请求失败，请确认服务正在运行';
                resultEl.textContent = e.toString();
            } finally {
                button.disabled = false;
            }
        });
    </script>
</body>
</html>
"#;
