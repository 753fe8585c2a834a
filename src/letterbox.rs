// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 预处理几何参数与坐标还原。
// 两种缩放体制: letterbox(等比+填充到32倍数)与普通拉伸缩放,
// 由模型家族决定使用哪一种。

/// Letterbox几何参数
///
/// 长边缩放到target, 两边各填充到32的倍数。
/// 还原公式 `(c - pad/2) / scale`, pad/2按整数除法取半 —
/// 奇数填充时两侧各差半个像素, 与训练端预处理一致。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    /// 缩放后(未填充)的宽高
    pub scaled_w: u32,
    pub scaled_h: u32,
    /// 两侧合计填充量(像素)
    pub wpad: u32,
    pub hpad: u32,
    /// 原图宽高
    pub orig_w: u32,
    pub orig_h: u32,
}

impl Letterbox {
    /// 由原图尺寸与目标边长计算几何参数
    pub fn compute(orig_w: u32, orig_h: u32, target: u32) -> Self {
        let (scale, scaled_w, scaled_h) = if orig_w > orig_h {
            let scale = target as f32 / orig_w as f32;
            (scale, target, (orig_h as f32 * scale) as u32)
        } else {
            let scale = target as f32 / orig_h as f32;
            (scale, (orig_w as f32 * scale) as u32, target)
        };
        // 填充到32的倍数, 保证各stride特征图尺寸为整数
        let wpad = (scaled_w + 31) / 32 * 32 - scaled_w;
        let hpad = (scaled_h + 31) / 32 * 32 - scaled_h;
        Self {
            scale,
            scaled_w,
            scaled_h,
            wpad,
            hpad,
            orig_w,
            orig_h,
        }
    }

    /// 网络输入(含填充)的宽高
    pub fn input_w(&self) -> u32 {
        self.scaled_w + self.wpad
    }

    pub fn input_h(&self) -> u32 {
        self.scaled_h + self.hpad
    }

    /// 原图坐标 → 网络输入坐标(测试用正向映射)
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + (self.wpad / 2) as f32,
            y * self.scale + (self.hpad / 2) as f32,
        )
    }

    /// 网络输入坐标 → 原图坐标, 裁剪到[0, dim-1]
    pub fn unmap_x(&self, x: f32) -> f32 {
        let x0 = (x - (self.wpad / 2) as f32) / self.scale;
        x0.clamp(0., (self.orig_w - 1) as f32)
    }

    pub fn unmap_y(&self, y: f32) -> f32 {
        let y0 = (y - (self.hpad / 2) as f32) / self.scale;
        y0.clamp(0., (self.orig_h - 1) as f32)
    }

    /// 还原一个(x1,y1,x2,y2)框
    pub fn unmap_box(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> (f32, f32, f32, f32) {
        (
            self.unmap_x(x1),
            self.unmap_y(y1),
            self.unmap_x(x2),
            self.unmap_y(y2),
        )
    }
}

/// 普通拉伸缩放(无填充), 两轴独立比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlainResize {
    /// 原图/目标 比例
    pub sx: f32,
    pub sy: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl PlainResize {
    pub fn compute(orig_w: u32, orig_h: u32, target_w: u32, target_h: u32) -> Self {
        Self {
            sx: orig_w as f32 / target_w as f32,
            sy: orig_h as f32 / target_h as f32,
            orig_w,
            orig_h,
        }
    }

    pub fn unmap_x(&self, x: f32) -> f32 {
        (x * self.sx).clamp(0., (self.orig_w - 1) as f32)
    }

    pub fn unmap_y(&self, y: f32) -> f32 {
        (y * self.sy).clamp(0., (self.orig_h - 1) as f32)
    }
}
